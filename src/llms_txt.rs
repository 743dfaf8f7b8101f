// LLM-friendly documentation endpoint content.

pub const LLMS_TXT: &str = r#"# Legal Battle API
> A courtroom strategy game: build a lawyer persona, face a randomly drawn opponent, and defend a case scored from stats, risk and the final move.

## API Base URL
/api/

## Authentication
None. Scores are attributed to the `user_id` supplied in the request.

## Key Endpoints
- POST /api/users - Create a user (name, email, company_name, role)
- GET/PUT /api/users/{id}/stats - Aggregate results / overwrite persona stats
- GET /api/users/{id}/scores - A user's scores, newest first (limit, offset)
- POST /api/scores - Save a score (0-100, "successful defense" | "failed defense")
- GET /api/leaderboard?limit=10 - Highest scores with player names
- GET /api/scenarios - Built-in case scenarios
- GET /api/characters - Opposing counsel roster
- POST /api/scenarios/{id}/options - Best/middle/worst approaches (cached)
- POST /api/case-outcome - Score a case and narrate the verdict
- POST /api/arguments/evaluate - Judge a free-form argument
- POST /api/arguments/feedback - Coaching feedback on an argument
- POST /api/arguments/closing - Draft a closing argument from a prompt and grade the prompt

## Match Flow
1. POST /api/matches - Create a persona (stats 1-10 each, 24 points total); draws scenario and opponent
2. POST /api/matches/{id}/strategy - Pick "low", "medium" or "high"
3. POST /api/matches/{id}/counter - Opponent answers (role: plaintiff | defense | opposition)
4. POST /api/matches/{id}/final-moves - Two final moves: high risk, then low risk
5. POST /api/matches/{id}/final-move - Choose by index with bonus_points (0-15) or hold_ms
6. POST /api/matches/{id}/outcome - Score, narrate and persist (once; a failed attempt can be retried)
- GET /api/matches/{id} - Current state and next step

Steps taken out of order return 409 with a `redirect` naming the step to resume from.

## Scoring
score = clamp(round(round(base * (0.7 + p * 0.003)) * (1 + b/100) + round(1.5 * b)), 0, 100)
where base is the clamped sum of the logic, charisma and risk components. 60 or more is a successful defense.

## Operations
- GET /health - Liveness
- GET /metrics - Prometheus metrics
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_match_routes() {
        for route in [
            "/api/matches/{id}/outcome",
            "/api/leaderboard",
            "/api/case-outcome",
            "/api/arguments/closing",
        ] {
            assert!(LLMS_TXT.contains(route), "missing {route}");
        }
    }
}
