//! Generated narrative: opponent moves, final move options, verdict
//! commentary and argument judging.
//!
//! Nothing produced here feeds back into [`crate::scoring`].

pub mod llm;
pub mod prompts;

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use rand::Rng;
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::catalog::{Character, DefensiveStrategy, Scenario};
use crate::metrics;
use crate::scoring::{OutcomeResult, RiskLevel, StatTriple};
use crate::session::FinalMoveOption;

use llm::{LlmError, LlmPort, LlmRequest};

/// Which side opposing counsel argues when answering the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterRole {
    Defense,
    #[default]
    Plaintiff,
    Opposition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionText {
    pub text: String,
    pub explanation: String,
}

/// Best / middle / worst approaches for a scenario's opening round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOptions {
    pub best: OptionText,
    pub middle: OptionText,
    pub worst: OptionText,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseAnalysis {
    #[serde(default)]
    pub analysis: String,
    #[serde(default, alias = "keyFactor")]
    pub key_factor: String,
    #[serde(default, alias = "opponentReaction")]
    pub opponent_reaction: String,
    #[serde(default)]
    pub advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentEvaluation {
    pub evaluation: String,
    pub player_points: i32,
    pub opponent_points: i32,
}

/// How the player fared in an earlier round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub player_score: i32,
    pub opponent_score: i32,
}

impl RoundResult {
    pub fn won(&self) -> bool {
        self.player_score > self.opponent_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosingArgument {
    pub argument: String,
    /// Prompt quality, 1-100.
    pub score: i32,
    pub feedback: String,
}

/// Everything the verdict commentary needs to know about a finished match.
#[derive(Debug, Clone, Copy)]
pub struct CaseContext<'a> {
    pub scenario: &'a Scenario,
    pub opponent: &'a Character,
    pub player_name: &'a str,
    pub player_stats: &'a StatTriple,
    pub strategy: &'a DefensiveStrategy,
    pub opponent_counter: &'a str,
    pub final_move: &'a FinalMoveOption,
    pub bonus_points: i32,
}

/// Player points when the judge's text carries no readable score.
const DEFAULT_ARGUMENT_POINTS: i32 = 50;
const DEFAULT_MOVE_PROBABILITY: i32 = 50;
const OPPONENT_JITTER: f64 = 10.0;

const CLOSING_BASE_SCORE: f64 = 50.0;
const CLOSING_CHARISMA_WEIGHT: f64 = 3.0;
const CLOSING_JITTER: f64 = 20.0;
const NO_FEEDBACK: &str = "No feedback available";

static POINTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:points|/100)").expect("valid regex"));

pub struct NarrativeService {
    llm: Arc<dyn LlmPort>,
    options_cache: TtlCache<i64, RoundOptions>,
}

impl NarrativeService {
    pub fn new(llm: Arc<dyn LlmPort>, options_ttl: Duration) -> Self {
        Self {
            llm,
            options_cache: TtlCache::new(options_ttl),
        }
    }

    async fn call(&self, kind: &'static str, request: LlmRequest) -> Result<String, LlmError> {
        let started = Instant::now();
        let result = self.llm.complete(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        metrics::LLM_REQUEST_DURATION_SECONDS
            .with_label_values(&[kind])
            .observe(elapsed);
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::LLM_REQUESTS_TOTAL
            .with_label_values(&[kind, status])
            .inc();

        match &result {
            Ok(text) => tracing::debug!(kind, elapsed, chars = text.len(), "LLM completion"),
            Err(e) => tracing::warn!(kind, elapsed, "LLM completion failed: {e}"),
        }
        result
    }

    /// Opening-round approaches, memoised per scenario.
    pub async fn strategy_options(&self, scenario: &Scenario) -> Result<RoundOptions, LlmError> {
        if let Some(cached) = self.options_cache.get(&scenario.id).await {
            metrics::OPTIONS_CACHE_LOOKUPS_TOTAL
                .with_label_values(&["hit"])
                .inc();
            tracing::debug!(scenario_id = scenario.id, "using cached strategy options");
            return Ok(cached);
        }
        metrics::OPTIONS_CACHE_LOOKUPS_TOTAL
            .with_label_values(&["miss"])
            .inc();

        let raw = self
            .call("strategy_options", prompts::strategy_options(scenario))
            .await?;
        let options: RoundOptions = parse_json(&raw)?;
        self.options_cache.insert(scenario.id, options.clone()).await;
        Ok(options)
    }

    pub async fn counter_move(
        &self,
        role: CounterRole,
        scenario: &Scenario,
        strategy: &DefensiveStrategy,
        opponent: &Character,
    ) -> Result<String, LlmError> {
        let raw = self
            .call(
                "counter_move",
                prompts::counter_move(role, scenario, strategy, opponent),
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    /// The two final moves, high risk first.
    pub async fn final_moves(
        &self,
        scenario: &Scenario,
        strategy: &DefensiveStrategy,
        opponent: &Character,
        counter: &str,
        player_stats: &StatTriple,
    ) -> Result<Vec<FinalMoveOption>, LlmError> {
        let raw = self
            .call(
                "final_moves",
                prompts::final_moves(scenario, strategy, opponent, counter, player_stats),
            )
            .await?;
        parse_final_moves(&raw)
    }

    pub async fn case_analysis(
        &self,
        ctx: &CaseContext<'_>,
        result: &OutcomeResult,
    ) -> Result<CaseAnalysis, LlmError> {
        let raw = self
            .call("case_analysis", prompts::case_analysis(ctx, result))
            .await?;
        parse_json(&raw)
    }

    pub async fn evaluate_argument(
        &self,
        scenario: &Scenario,
        player_stats: &StatTriple,
        argument: &str,
        opponent: &Character,
    ) -> Result<ArgumentEvaluation, LlmError> {
        let evaluation = self
            .call(
                "evaluate_argument",
                prompts::evaluate_argument(scenario, player_stats, argument),
            )
            .await?;
        let player_points = extract_points(&evaluation).unwrap_or(DEFAULT_ARGUMENT_POINTS);
        let jitter = rand::thread_rng().gen_range(-OPPONENT_JITTER..OPPONENT_JITTER);
        Ok(ArgumentEvaluation {
            evaluation,
            player_points,
            opponent_points: opponent_points(&opponent.stats, jitter),
        })
    }

    pub async fn argument_feedback(
        &self,
        scenario: &Scenario,
        strategy: &DefensiveStrategy,
        player_stats: &StatTriple,
        argument: &str,
    ) -> Result<String, LlmError> {
        let raw = self
            .call(
                "argument_feedback",
                prompts::argument_feedback(scenario, strategy, player_stats, argument),
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    /// Draft a closing argument from the player's prompt and grade the prompt.
    pub async fn closing_argument(
        &self,
        scenario: &Scenario,
        prompt: &str,
        charisma: i32,
        logic: &RoundResult,
        risk: &RoundResult,
    ) -> Result<ClosingArgument, LlmError> {
        let argument = self
            .call(
                "closing_argument",
                prompts::closing_argument(scenario, prompt, charisma, logic, risk),
            )
            .await?;
        let argument = argument.trim();
        if argument.is_empty() {
            return Err(LlmError::InvalidResponse(
                "empty closing argument".to_string(),
            ));
        }

        let feedback = self
            .call("closing_feedback", prompts::closing_feedback(prompt))
            .await?;
        let feedback = match feedback.trim() {
            "" => NO_FEEDBACK.to_string(),
            text => text.to_string(),
        };

        let jitter = rand::thread_rng().gen_range(0.0..CLOSING_JITTER);
        Ok(ClosingArgument {
            argument: argument.to_string(),
            score: closing_score(charisma, jitter),
            feedback,
        })
    }
}

/// Parse a JSON completion, tolerating a surrounding markdown code fence.
fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMove {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    probability: Option<serde_json::Value>,
    #[serde(default)]
    potential_impact: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoves {
    #[serde(default)]
    high_risk_option: Option<RawMove>,
    #[serde(default)]
    low_risk_option: Option<RawMove>,
}

fn parse_final_moves(raw: &str) -> Result<Vec<FinalMoveOption>, LlmError> {
    let moves: RawMoves = parse_json(raw)?;
    let convert = |m: Option<RawMove>, risk: RiskLevel| {
        let m = m.unwrap_or_default();
        let probability = m
            .probability
            .as_ref()
            .and_then(|v| v.as_f64())
            .map(|p| p.round() as i32)
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_MOVE_PROBABILITY)
            .clamp(1, 100);
        FinalMoveOption {
            description: m.description.unwrap_or_default(),
            risk,
            probability,
            potential_impact: m.potential_impact.unwrap_or_default(),
        }
    };
    Ok(vec![
        convert(moves.high_risk_option, RiskLevel::High),
        convert(moves.low_risk_option, RiskLevel::Low),
    ])
}

/// First number written as "NN points" or "NN/100".
fn extract_points(text: &str) -> Option<i32> {
    POINTS_RE
        .captures_iter(text)
        .find_map(|caps| caps[1].parse().ok())
}

/// Closing prompt grade: charisma-weighted base plus jitter, 1-100.
fn closing_score(charisma: i32, jitter: f64) -> i32 {
    let raw = CLOSING_BASE_SCORE + charisma as f64 * CLOSING_CHARISMA_WEIGHT + jitter;
    raw.clamp(1.0, 100.0).round() as i32
}

/// Opposing counsel's points: stat total on a 100 scale plus jitter.
fn opponent_points(stats: &StatTriple, jitter: f64) -> i32 {
    let normalized = stats.total() as f64 / 30.0 * 100.0;
    ((normalized + jitter).round() as i32).clamp(0, 100)
}
