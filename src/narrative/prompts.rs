// Prompt builders for each kind of generated text.

use crate::catalog::{Character, DefensiveStrategy, Scenario};
use crate::scoring::{OutcomeResult, StatTriple};

use super::llm::LlmRequest;
use super::{CaseContext, CounterRole, RoundResult};

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn stat_lines(stats: &StatTriple) -> String {
    format!(
        "- Logic: {}/10\n- Charisma: {}/10\n- Risk: {}/10",
        stats.logic, stats.charisma, stats.risk
    )
}

fn strategy_block(strategy: &DefensiveStrategy) -> String {
    format!(
        "{}\n{}\n\nRisk Level: {}\nPotential Reward: {}",
        strategy.name,
        strategy.description.join("; "),
        strategy.risk,
        strategy.reward
    )
}

pub fn strategy_options(scenario: &Scenario) -> LlmRequest {
    let ctx = &scenario.context;
    let prompt = format!(
        "As an expert legal advisor, generate three different strategic approaches \
(best, middle, and worst) for the following legal scenario. Each approach should be \
realistic but clearly differentiated in terms of effectiveness.

SCENARIO CONTEXT:
Domain: {domain}
Key Issues: {issues}
Stakeholders: {stakeholders}
Constraints: {constraints}

CURRENT SITUATION:
{description}

SPECIFIC PROMPT:
{prompt}

1. Best approach - a strategic, well-reasoned solution that addresses the core issues
2. Middle approach - a conventional but incomplete solution
3. Worst approach - a problematic solution that could create new legal risks

Format as JSON:
{{
  \"best\": {{ \"text\": \"action\", \"explanation\": \"why\" }},
  \"middle\": {{ \"text\": \"action\", \"explanation\": \"why\" }},
  \"worst\": {{ \"text\": \"action\", \"explanation\": \"why\" }}
}}",
        domain = ctx.legal_domain,
        issues = ctx.key_issues.join(", "),
        stakeholders = ctx.stakeholders.join(", "),
        constraints = ctx.constraints.join(", "),
        description = scenario.description,
        prompt = scenario.logic_prompt,
    );
    LlmRequest::new(prompt).max_tokens(1000).json()
}

pub fn counter_move(
    role: CounterRole,
    scenario: &Scenario,
    strategy: &DefensiveStrategy,
    opponent: &Character,
) -> LlmRequest {
    let (persona, framing) = match role {
        CounterRole::Plaintiff => (
            "an aggressive corporate lawyer",
            format!(
                "Plaintiff's Position (Your Position):\n{}\n\nDefendant's Position (Their Position):\n{}",
                scenario.plaintiff_position, scenario.defense_position
            ),
        ),
        CounterRole::Defense => (
            "a tenacious defense attorney",
            format!(
                "Defendant's Position (Your Position):\n{}\n\nPlaintiff's Position (Their Position):\n{}",
                scenario.defense_position, scenario.plaintiff_position
            ),
        ),
        CounterRole::Opposition => (
            "opposing counsel",
            format!(
                "Your side opposes the player's position:\n{}",
                scenario.defense_position
            ),
        ),
    };

    let system = format!(
        "You are {name}, {persona} known for your quote: \"{quote}\"

Your stats:
- Logic: {logic}/10 (Higher means more technical/procedural moves)
- Charisma: {charisma}/10 (Higher means more persuasive/emotional moves)
- Risk Tolerance: {risk}/10 (Higher means more aggressive/bold moves)

Case Context:
{title}
{description}

{framing}

Stakes: {stakes}
Complexity: {complexity}

Key Issues:
{issues}

The other lawyer has chosen this strategy:
{strategy}

Generate a brief counter move that reflects your personality, makes a specific legal \
move, directly challenges their strategy, and ends with a short witty quip. No more than \
2-3 sentences total.",
        name = opponent.name,
        quote = opponent.quote,
        logic = opponent.stats.logic,
        charisma = opponent.stats.charisma,
        risk = opponent.stats.risk,
        title = scenario.title,
        description = scenario.description,
        stakes = scenario.stakes,
        complexity = scenario.complexity,
        issues = bullets(&scenario.context.key_issues),
        strategy = strategy_block(strategy),
    );
    LlmRequest::new("Generate a counter move.")
        .with_system(system)
        .max_tokens(150)
}

pub fn final_moves(
    scenario: &Scenario,
    strategy: &DefensiveStrategy,
    opponent: &Character,
    counter: &str,
    player_stats: &StatTriple,
) -> LlmRequest {
    let system = format!(
        "You are a legal strategy AI assistant. Given the following case scenario and game \
state, generate two distinct final defensive moves for the player.

Case: {description}

Player's Stats:
{stats}

Game State:
1. Player's Initial Defensive Strategy: {strategy}
2. Opponent's Move ({opponent}): {counter}

Generate two defensive options:
1. A high-risk, high-reward defensive move
2. A lower-risk, more conservative defensive move

Respond in this exact JSON format:
{{
  \"highRiskOption\": {{
    \"description\": \"2-3 sentence defensive move\",
    \"risk\": \"high\",
    \"probability\": 40,
    \"potentialImpact\": \"brief impact description\"
  }},
  \"lowRiskOption\": {{
    \"description\": \"2-3 sentence defensive move\",
    \"risk\": \"low\",
    \"probability\": 75,
    \"potentialImpact\": \"brief impact description\"
  }}
}}

probability is a number between 1 and 100; the high risk option should have the lower \
probability.",
        description = scenario.description,
        stats = stat_lines(player_stats),
        strategy = strategy_block(strategy),
        opponent = opponent.name,
    );
    LlmRequest::new("Generate the two final defensive moves.")
        .with_system(system)
        .json()
}

pub fn case_analysis(ctx: &CaseContext<'_>, result: &OutcomeResult) -> LlmRequest {
    let succeeded = result.outcome.is_success();
    let verdict = if succeeded {
        "Successfully Defended"
    } else {
        "Takeover Succeeded"
    };
    let word = if succeeded { "succeeded" } else { "failed" };

    let system = format!(
        "You are a legal analysis AI. Analyze this defensive case outcome and generate a brief \
analysis explaining the result.

Case: {description}

Defender ({player}):
{player_stats}
- Initial Defense: {strategy}
- Final Defensive Move: {final_move}
- Power-Up Bonus: +{bonus} points

Aggressor ({opponent}):
{opponent_stats}
- Aggressive Move: {counter}
- Character Quote: \"{quote}\"
- Opening Statement: \"{opening}\"

Final Score: {score}/100
Outcome: {verdict}

Generate a JSON response in this format that MATCHES the final score and outcome:
{{
  \"analysis\": \"2-3 sentences explaining why the defense {word} with a score of {score}\",
  \"keyFactor\": \"one sentence on the most critical factor\",
  \"opponentReaction\": \"a witty, character-specific one-liner from {opponent}\",
  \"advice\": \"one sentence of advice for future cases\"
}}",
        description = ctx.scenario.description,
        player = ctx.player_name,
        player_stats = stat_lines(ctx.player_stats),
        strategy = ctx.strategy.description.join("; "),
        final_move = ctx.final_move.description,
        bonus = ctx.bonus_points,
        opponent = ctx.opponent.name,
        opponent_stats = stat_lines(&ctx.opponent.stats),
        counter = ctx.opponent_counter,
        quote = ctx.opponent.quote,
        opening = ctx.opponent.opening_statement,
        score = result.score,
    );
    LlmRequest::new("Generate the case analysis that matches the score and outcome.")
        .with_system(system)
        .max_tokens(300)
        .json()
}

pub fn evaluate_argument(
    scenario: &Scenario,
    player_stats: &StatTriple,
    argument: &str,
) -> LlmRequest {
    let system = format!(
        "You are judging a legal battle game. Evaluate the following legal argument based on \
the context:

Scenario: {title}
{description}

Player's Stats:
{stats}

Player's Argument:
{argument}

Evaluate the argument on relevance, legal reasoning, persuasiveness, and strategic \
creativity (25 points each). Provide a score out of 100 written as \"NN/100\" and a brief \
explanation of the ruling, highlighting how well they used their strongest stats.",
        title = scenario.title,
        description = scenario.description,
        stats = stat_lines(player_stats),
    );
    LlmRequest::new("Judge this argument.").with_system(system)
}

pub fn argument_feedback(
    scenario: &Scenario,
    strategy: &DefensiveStrategy,
    player_stats: &StatTriple,
    argument: &str,
) -> LlmRequest {
    let system = format!(
        "You are an expert legal AI assistant evaluating a lawyer's argument for their case.

The case involves: {description}

Key Issues:
{issues}

Stakeholders:
{stakeholders}

The lawyer chose the following strategy:
{strategy}

The lawyer has the following stats:
{stats}

Provide constructive feedback (2-3 paragraphs) that highlights the strongest aspects of \
their argument, identifies areas for improvement, and comments on whether the argument \
matches the risk level of their chosen strategy. Keep an encouraging but professional tone.",
        description = scenario.description,
        issues = bullets(&scenario.context.key_issues),
        stakeholders = bullets(&scenario.context.stakeholders),
        strategy = strategy_block(strategy),
        stats = stat_lines(player_stats),
    );
    LlmRequest::new(argument).with_system(system)
}

fn round_line(name: &str, round: &RoundResult) -> String {
    let verdict = if round.won() { "Won" } else { "Lost" };
    format!("- {name}: {verdict} (Score: {})", round.player_score)
}

pub fn closing_argument(
    scenario: &Scenario,
    prompt: &str,
    charisma: i32,
    logic: &RoundResult,
    risk: &RoundResult,
) -> LlmRequest {
    let system = format!(
        "You are an expert legal AI assistant helping a lawyer craft their closing argument.
The case involves: {description}

Previous round performance:
{logic}
{risk}

Generate a compelling closing argument (max 250 words) based on the lawyer's prompt. \
The lawyer has a Charisma score of {charisma}/10, which should influence the emotional impact.",
        description = scenario.description,
        logic = round_line("Logic Round", logic),
        risk = round_line("Risk Round", risk),
    );
    LlmRequest::new(prompt).with_system(system)
}

pub fn closing_feedback(prompt: &str) -> LlmRequest {
    LlmRequest::new(prompt)
        .with_system(
            "You are a legal expert providing brief, constructive feedback on a closing \
argument prompt. Keep your response to 2-3 sentences.",
        )
        .max_tokens(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, StrategyLevel};

    #[test]
    fn test_counter_prompt_framing_by_role() {
        let catalog = Catalog::builtin().unwrap();
        let scenario = catalog.scenario(1).unwrap();
        let strategy = scenario.defensive_strategies.get(StrategyLevel::High);
        let opponent = catalog.character("harvey-spector").unwrap();

        let plaintiff = counter_move(CounterRole::Plaintiff, scenario, strategy, opponent);
        let system = plaintiff.system_prompt.unwrap();
        assert!(system.contains("Plaintiff's Position (Your Position)"));
        assert!(system.contains("Harvey Spector"));
        assert!(system.contains("White Knight Gambit"));
        assert_eq!(plaintiff.max_tokens, 150);

        let defense = counter_move(CounterRole::Defense, scenario, strategy, opponent);
        assert!(defense
            .system_prompt
            .unwrap()
            .contains("Defendant's Position (Your Position)"));
    }

    #[test]
    fn test_closing_prompt_reports_rounds() {
        let catalog = Catalog::builtin().unwrap();
        let won = RoundResult {
            player_score: 82,
            opponent_score: 60,
        };
        let lost = RoundResult {
            player_score: 30,
            opponent_score: 30,
        };
        let req = closing_argument(catalog.scenario(1).unwrap(), "Stress loyalty", 7, &won, &lost);
        let system = req.system_prompt.unwrap();
        assert!(system.contains("- Logic Round: Won (Score: 82)"));
        assert!(system.contains("- Risk Round: Lost (Score: 30)"));
        assert!(system.contains("Charisma score of 7/10"));
        assert_eq!(req.user_message, "Stress loyalty");

        assert_eq!(closing_feedback("Stress loyalty").max_tokens, 100);
    }

    #[test]
    fn test_options_prompt_requests_json() {
        let catalog = Catalog::builtin().unwrap();
        let req = strategy_options(catalog.scenario(2).unwrap());
        assert!(req.json_response);
        assert!(req.user_message.contains("Intellectual Property Law"));
    }
}
