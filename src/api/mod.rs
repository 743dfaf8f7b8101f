// HTTP API routes (users, scores, catalog, match flow, narrative).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::catalog::{Catalog, Character, Scenario, StrategyLevel};
use crate::db::{Database, NewScore, NewUser};
use crate::error::AppError;
use crate::metrics;
use crate::narrative::{CaseAnalysis, CaseContext, CounterRole, NarrativeService, RoundResult};
use crate::persona;
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::scoring::{self, CaseEvaluation, RiskLevel, StatTriple};
use crate::session::{FinalMoveOption, MatchSession, SessionStore, SessionVerdict, Stage};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct StartMatchRequest {
    pub user_id: Option<i64>,
    pub player_name: String,
    pub stats: StatTriple,
}

#[derive(Deserialize)]
pub struct SelectStrategyRequest {
    pub strategy: StrategyLevel,
}

#[derive(Deserialize)]
pub struct CounterRequest {
    #[serde(default)]
    pub role: CounterRole,
}

#[derive(Deserialize)]
pub struct ChooseFinalMoveRequest {
    /// 0 = high risk, 1 = low risk, in the order the moves were offered.
    pub index: usize,
    pub bonus_points: Option<i32>,
    /// How long the power-up was held, when the client reports the raw hold.
    pub hold_ms: Option<u64>,
}

#[derive(Deserialize)]
pub struct FinalMoveInput {
    #[serde(default)]
    pub description: String,
    pub risk: RiskLevel,
    pub probability: i32,
}

/// Everything optional so a missing field is reported as 400 with a
/// readable message instead of an extractor rejection.
#[derive(Deserialize)]
pub struct CaseOutcomeRequest {
    pub player_name: Option<String>,
    pub player_stats: Option<StatTriple>,
    pub scenario_id: Option<i64>,
    pub selected_strategy: Option<StrategyLevel>,
    pub opponent_id: Option<String>,
    #[serde(default)]
    pub opponent_counter: String,
    pub final_move: Option<FinalMoveInput>,
    #[serde(default)]
    pub power_up_points: i32,
}

#[derive(Deserialize)]
pub struct EvaluateArgumentRequest {
    pub scenario_id: i64,
    pub opponent_id: String,
    pub player_stats: StatTriple,
    pub argument: String,
}

#[derive(Deserialize)]
pub struct ArgumentFeedbackRequest {
    pub scenario_id: i64,
    pub strategy: StrategyLevel,
    pub player_stats: StatTriple,
    pub argument: String,
}

#[derive(Deserialize)]
pub struct ClosingArgumentRequest {
    pub scenario_id: i64,
    pub prompt: String,
    pub charisma: i32,
    pub logic_result: RoundResult,
    pub risk_result: RoundResult,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub catalog: Arc<Catalog>,
    pub narrative: Arc<NarrativeService>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: RateLimiter,
}

fn find_scenario(catalog: &Catalog, id: i64) -> Result<&Scenario, AppError> {
    catalog
        .scenario(id)
        .ok_or_else(|| AppError::not_found(format!("Scenario {id} not found")))
}

fn find_character<'a>(catalog: &'a Catalog, id: &str) -> Result<&'a Character, AppError> {
    catalog
        .character(id)
        .ok_or_else(|| AppError::not_found(format!("Character {id} not found")))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/llms.txt", get(get_llms_txt))
        // Users and scores
        .route("/api/users", post(create_user))
        .route(
            "/api/users/{id}/stats",
            get(get_user_stats).put(update_user_stats),
        )
        .route("/api/users/{id}/scores", get(list_user_scores))
        .route("/api/scores", post(save_score))
        .route("/api/leaderboard", get(leaderboard))
        // Catalog
        .route("/api/scenarios", get(list_scenarios))
        .route("/api/scenarios/{id}/options", post(scenario_options))
        .route("/api/characters", get(list_characters))
        // Stateless scoring and judging
        .route("/api/case-outcome", post(case_outcome))
        .route("/api/arguments/evaluate", post(evaluate_argument))
        .route("/api/arguments/feedback", post(argument_feedback))
        .route("/api/arguments/closing", post(closing_argument))
        // Match flow
        .route("/api/matches", post(start_match))
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/strategy", post(select_strategy))
        .route("/api/matches/{id}/counter", post(generate_counter))
        .route("/api/matches/{id}/final-moves", post(generate_final_moves))
        .route("/api/matches/{id}/final-move", post(choose_final_move))
        .route("/api/matches/{id}/outcome", post(match_outcome))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let started = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

// ── Service handlers ──────────────────────────────────────────────────

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "legal-battle-backend" }))
}

async fn get_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics::gather_metrics(),
    )
}

async fn get_llms_txt() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        crate::llms_txt::LLMS_TXT,
    )
}

// ── User and score handlers ───────────────────────────────────────────

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.db.create_user(&req).await?;
    Ok((StatusCode::CREATED, Json(json!(user))))
}

async fn get_user_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .db
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let stats = state
        .db
        .user_stats(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(json!({
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "company_name": user.company_name,
            "role": user.role,
        },
        "stats": stats,
    })))
}

async fn update_user_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(stats): Json<StatTriple>,
) -> Result<Json<Value>, AppError> {
    persona::validate_stats(&stats).map_err(AppError::InvalidInput)?;
    let user = state
        .db
        .update_user_stats(id, &stats)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(json!({ "user": user })))
}

async fn list_user_scores(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    if state.db.get_user(id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }
    let scores = state.db.list_user_scores(id, limit, offset).await?;
    let total = state.db.count_user_scores(id).await?;

    Ok(Json(json!({
        "scores": scores,
        "pagination": { "total": total, "limit": limit, "offset": offset },
    })))
}

async fn save_score(
    State(state): State<AppState>,
    Json(req): Json<NewScore>,
) -> Result<impl IntoResponse, AppError> {
    state
        .rate_limiter
        .check_limit(req.user_id, RateLimitType::ScoreSubmissions)?;
    let score = state.db.save_score(&req).await?;
    metrics::SCORES_SAVED_TOTAL.inc();
    Ok((StatusCode::CREATED, Json(json!(score))))
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let scores = state.db.leaderboard(limit).await?;
    Ok(Json(json!({ "scores": scores })))
}

// ── Catalog handlers ──────────────────────────────────────────────────

async fn list_scenarios(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.catalog.scenarios))
}

async fn list_characters(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.catalog.characters))
}

async fn scenario_options(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let scenario = find_scenario(&state.catalog, id)?;
    let options = state
        .narrative
        .strategy_options(scenario)
        .await
        .map_err(AppError::upstream("Failed to generate options"))?;
    Ok(Json(json!(options)))
}

// ── Stateless scoring and judging ─────────────────────────────────────

async fn case_outcome(
    State(state): State<AppState>,
    Json(req): Json<CaseOutcomeRequest>,
) -> Result<Json<Value>, AppError> {
    let (Some(player_stats), Some(scenario_id), Some(level), Some(opponent_id), Some(final_move)) = (
        req.player_stats,
        req.scenario_id,
        req.selected_strategy,
        req.opponent_id.as_deref(),
        req.final_move.as_ref(),
    ) else {
        return Err(AppError::invalid("Missing required fields"));
    };
    let scenario = find_scenario(&state.catalog, scenario_id)?;
    let opponent = find_character(&state.catalog, opponent_id)?;

    let evaluation = scoring::evaluate_case(
        &player_stats,
        &opponent.stats,
        final_move.risk,
        final_move.probability,
        req.power_up_points,
    );
    metrics::CASES_SCORED_TOTAL
        .with_label_values(&[evaluation.result.outcome.as_str()])
        .inc();

    let chosen = FinalMoveOption {
        description: final_move.description.clone(),
        risk: final_move.risk,
        probability: final_move.probability,
        potential_impact: String::new(),
    };
    let ctx = CaseContext {
        scenario,
        opponent,
        player_name: req.player_name.as_deref().unwrap_or("The defender"),
        player_stats: &player_stats,
        strategy: scenario.defensive_strategies.get(level),
        opponent_counter: &req.opponent_counter,
        final_move: &chosen,
        bonus_points: req.power_up_points,
    };
    let analysis = state
        .narrative
        .case_analysis(&ctx, &evaluation.result)
        .await
        .map_err(AppError::upstream("Failed to calculate case outcome"))?;

    Ok(Json(json!({
        "score": evaluation.result.score,
        "outcome": evaluation.result.outcome,
        "breakdown": evaluation.breakdown,
        "analysis": analysis.analysis,
        "key_factor": analysis.key_factor,
        "opponent_reaction": analysis.opponent_reaction,
        "advice": analysis.advice,
    })))
}

async fn evaluate_argument(
    State(state): State<AppState>,
    Json(req): Json<EvaluateArgumentRequest>,
) -> Result<Json<Value>, AppError> {
    if req.argument.trim().is_empty() {
        return Err(AppError::invalid("Missing required fields"));
    }
    let scenario = find_scenario(&state.catalog, req.scenario_id)?;
    let opponent = find_character(&state.catalog, &req.opponent_id)?;
    let evaluation = state
        .narrative
        .evaluate_argument(scenario, &req.player_stats, &req.argument, opponent)
        .await
        .map_err(AppError::upstream("Failed to evaluate argument"))?;
    Ok(Json(json!(evaluation)))
}

async fn argument_feedback(
    State(state): State<AppState>,
    Json(req): Json<ArgumentFeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    if req.argument.trim().is_empty() {
        return Err(AppError::invalid("Missing required fields"));
    }
    let scenario = find_scenario(&state.catalog, req.scenario_id)?;
    let feedback = state
        .narrative
        .argument_feedback(
            scenario,
            scenario.defensive_strategies.get(req.strategy),
            &req.player_stats,
            &req.argument,
        )
        .await
        .map_err(AppError::upstream("Failed to generate feedback"))?;
    Ok(Json(json!({ "feedback": feedback })))
}

async fn closing_argument(
    State(state): State<AppState>,
    Json(req): Json<ClosingArgumentRequest>,
) -> Result<Json<Value>, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::invalid("Missing required fields"));
    }
    if !(persona::MIN_STAT..=persona::MAX_STAT).contains(&req.charisma) {
        return Err(AppError::invalid(format!(
            "charisma must be between {} and {}, got {}",
            persona::MIN_STAT,
            persona::MAX_STAT,
            req.charisma
        )));
    }
    let scenario = find_scenario(&state.catalog, req.scenario_id)?;
    let closing = state
        .narrative
        .closing_argument(
            scenario,
            &req.prompt,
            req.charisma,
            &req.logic_result,
            &req.risk_result,
        )
        .await
        .map_err(AppError::upstream("Failed to generate closing argument"))?;
    Ok(Json(json!(closing)))
}

// ── Match flow handlers ───────────────────────────────────────────────

fn match_view(catalog: &Catalog, session: &MatchSession) -> Value {
    json!({
        "session": session,
        "next_step": session.stage.next_step(),
        "scenario": catalog.scenario(session.scenario_id),
        "opponent": catalog.character(&session.opponent_id),
    })
}

/// Count a generation step against the player's hourly budget. Anonymous
/// sessions are not tracked.
fn check_generation_limit(state: &AppState, session: &MatchSession) -> Result<(), AppError> {
    if let Some(user_id) = session.user_id {
        state
            .rate_limiter
            .check_limit(user_id, RateLimitType::LlmGenerations)?;
    }
    Ok(())
}

async fn start_match(
    State(state): State<AppState>,
    Json(req): Json<StartMatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let player_name = req.player_name.trim();
    if player_name.is_empty() {
        return Err(AppError::invalid("player_name is required"));
    }
    persona::validate_stats(&req.stats).map_err(AppError::InvalidInput)?;

    if let Some(user_id) = req.user_id {
        if state.db.update_user_stats(user_id, &req.stats).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }
    }

    let (scenario, opponent) = state.catalog.random_matchup(&mut rand::thread_rng());
    let session = MatchSession::start(
        req.user_id,
        player_name,
        req.stats,
        scenario.id,
        &opponent.id,
    );
    state.sessions.insert(session.clone()).await;
    metrics::MATCHES_STARTED_TOTAL.inc();
    tracing::info!(
        session_id = %session.id,
        scenario_id = scenario.id,
        opponent = %opponent.id,
        "Match started"
    );

    Ok((StatusCode::CREATED, Json(match_view(&state.catalog, &session))))
}

async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(match_view(&state.catalog, &session)))
}

async fn select_strategy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectStrategyRequest>,
) -> Result<Json<Value>, AppError> {
    let session = state
        .sessions
        .transition(id, |s| s.select_strategy(req.strategy))
        .await?;
    Ok(Json(match_view(&state.catalog, &session)))
}

async fn generate_counter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CounterRequest>,
) -> Result<Json<Value>, AppError> {
    let role = req.role;
    let session = state.sessions.get(id).await?;
    session.ensure_stage(&[Stage::StrategySelected, Stage::CounterIssued])?;
    let level = session.require_strategy()?;
    check_generation_limit(&state, &session)?;

    let scenario = find_scenario(&state.catalog, session.scenario_id)?;
    let opponent = find_character(&state.catalog, &session.opponent_id)?;
    let counter = state
        .narrative
        .counter_move(role, scenario, scenario.defensive_strategies.get(level), opponent)
        .await
        .map_err(AppError::upstream("Failed to generate counter move"))?;

    let session = state
        .sessions
        .transition(id, |s| s.record_counter(counter.clone()))
        .await?;
    Ok(Json(json!({
        "counter": counter,
        "match": match_view(&state.catalog, &session),
    })))
}

async fn generate_final_moves(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.sessions.get(id).await?;
    session.ensure_stage(&[Stage::CounterIssued, Stage::MovesOffered])?;
    let level = session.require_strategy()?;
    let counter = session.require_counter()?;
    check_generation_limit(&state, &session)?;

    let scenario = find_scenario(&state.catalog, session.scenario_id)?;
    let opponent = find_character(&state.catalog, &session.opponent_id)?;
    let moves = state
        .narrative
        .final_moves(
            scenario,
            scenario.defensive_strategies.get(level),
            opponent,
            counter,
            &session.player_stats,
        )
        .await
        .map_err(AppError::upstream("Failed to generate final moves"))?;

    let session = state
        .sessions
        .transition(id, |s| s.offer_moves(moves.clone()))
        .await?;
    Ok(Json(json!({
        "moves": moves,
        "match": match_view(&state.catalog, &session),
    })))
}

async fn choose_final_move(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChooseFinalMoveRequest>,
) -> Result<Json<Value>, AppError> {
    let bonus_points = match (req.bonus_points, req.hold_ms) {
        (Some(points), _) => {
            persona::validate_bonus(points).map_err(AppError::InvalidInput)?;
            points
        }
        (None, Some(ms)) => persona::bonus_from_hold(Duration::from_millis(ms)),
        (None, None) => 0,
    };

    let session = state
        .sessions
        .transition(id, |s| s.choose_final_move(req.index, bonus_points))
        .await?;
    Ok(Json(match_view(&state.catalog, &session)))
}

async fn match_outcome(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    // Claim first so overlapping requests cannot both persist a score.
    let claimed = state.sessions.transition(id, |s| s.begin_scoring()).await?;

    let (evaluation, analysis, score_id) = match score_claimed(&state, &claimed).await {
        Ok(scored) => scored,
        Err(e) => {
            if let Err(release) = state.sessions.transition(id, |s| s.release_scoring()).await {
                tracing::warn!(session_id = %id, "Could not release scoring claim: {release}");
            }
            return Err(e);
        }
    };
    let result = evaluation.result;

    let verdict = SessionVerdict {
        result,
        breakdown: evaluation.breakdown,
        score_id,
    };
    let session = state
        .sessions
        .transition(id, |s| s.record_verdict(verdict))
        .await?;
    metrics::CASES_SCORED_TOTAL
        .with_label_values(&[result.outcome.as_str()])
        .inc();
    tracing::info!(
        session_id = %id,
        score = result.score,
        outcome = %result.outcome,
        "Match scored"
    );

    Ok(Json(json!({
        "score": result.score,
        "outcome": result.outcome,
        "breakdown": evaluation.breakdown,
        "base_score": evaluation.base_score,
        "probability_score": evaluation.probability_score,
        "analysis": analysis,
        "score_id": score_id,
        "match": match_view(&state.catalog, &session),
    })))
}

/// Score, narrate and persist a session this request has claimed.
async fn score_claimed(
    state: &AppState,
    session: &MatchSession,
) -> Result<(CaseEvaluation, CaseAnalysis, Option<i64>), AppError> {
    let level = session.require_strategy()?;
    let counter = session.require_counter()?;
    let final_move = session.require_final_move()?;

    let scenario = find_scenario(&state.catalog, session.scenario_id)?;
    let opponent = find_character(&state.catalog, &session.opponent_id)?;

    let evaluation = scoring::evaluate_case(
        &session.player_stats,
        &opponent.stats,
        final_move.risk,
        final_move.probability,
        session.bonus_points,
    );
    let result = evaluation.result;

    let ctx = CaseContext {
        scenario,
        opponent,
        player_name: &session.player_name,
        player_stats: &session.player_stats,
        strategy: scenario.defensive_strategies.get(level),
        opponent_counter: counter,
        final_move,
        bonus_points: session.bonus_points,
    };
    let analysis = state
        .narrative
        .case_analysis(&ctx, &result)
        .await
        .map_err(AppError::upstream("Failed to calculate case outcome"))?;

    let score_id = match session.user_id {
        Some(user_id) => {
            state
                .rate_limiter
                .check_limit(user_id, RateLimitType::ScoreSubmissions)?;
            let saved = state
                .db
                .save_score(&NewScore {
                    user_id,
                    scenario_id: scenario.id,
                    score: result.score,
                    outcome: result.outcome.as_str().to_string(),
                    logic_score: Some(evaluation.breakdown.logic_score),
                    charisma_score: Some(evaluation.breakdown.charisma_score),
                    risk_score: Some(evaluation.breakdown.risk_score),
                })
                .await?;
            metrics::SCORES_SAVED_TOTAL.inc();
            Some(saved.id)
        }
        None => None,
    };

    Ok((evaluation, analysis, score_id))
}
