// Case-outcome scoring.
//
// Stat comparison + risk alignment, scaled by the final move's success
// probability and boosted by the power-up bonus. Pure and deterministic:
// the trace events below are the only side effect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final scores at or above this are a successful defense.
pub const SUCCESS_THRESHOLD: i32 = 60;
pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 100;

// Logic and charisma components
const STAT_BASE: i64 = 25;
const STAT_DIFF_WEIGHT: i64 = 2;
const STAT_ADJUST_MIN: i64 = -15;
const STAT_ADJUST_MAX: i64 = 10;

// Risk-strategy component
const RISK_BASE: i32 = 10;
const AGGRESSIVE_RISK_THRESHOLD: i32 = 7;

// Probability factor 0.7 + p/100 * 0.3, in thousandths.
const PROBABILITY_FLOOR_MILLI: i64 = 700;
const PROBABILITY_SLOPE_MILLI: i64 = 3;

/// A character build: three stats, 1-10 by game convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatTriple {
    pub logic: i32,
    pub charisma: i32,
    pub risk: i32,
}

impl StatTriple {
    pub fn new(logic: i32, charisma: i32, risk: i32) -> Self {
        Self {
            logic,
            charisma,
            risk,
        }
    }

    pub fn total(&self) -> i32 {
        self.logic + self.charisma + self.risk
    }
}

/// Risk level of a final move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Low,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Low => "low",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an opponent plays, derived from their risk stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Aggressive,
    Conservative,
}

impl Stance {
    pub fn of(opponent: &StatTriple) -> Self {
        if opponent.risk >= AGGRESSIVE_RISK_THRESHOLD {
            Stance::Aggressive
        } else {
            Stance::Conservative
        }
    }

    /// Points added to the risk base for answering this stance with a move
    /// of the given risk.
    pub fn adjustment(self, final_move_risk: RiskLevel) -> i32 {
        match (self, final_move_risk) {
            (Stance::Aggressive, RiskLevel::High) => 20,
            (Stance::Aggressive, RiskLevel::Low) => -5,
            (Stance::Conservative, RiskLevel::Low) => 15,
            (Stance::Conservative, RiskLevel::High) => 5,
        }
    }
}

/// The three sub-scores, before any clamping or scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub logic_score: i32,
    pub charisma_score: i32,
    pub risk_score: i32,
}

impl ScoreBreakdown {
    pub fn compute(player: &StatTriple, opponent: &StatTriple, final_move_risk: RiskLevel) -> Self {
        let stance = Stance::of(opponent);
        Self {
            logic_score: stat_component(player.logic, opponent.logic),
            charisma_score: stat_component(player.charisma, opponent.charisma),
            risk_score: RISK_BASE + stance.adjustment(final_move_risk),
        }
    }

    pub fn raw_total(&self) -> i32 {
        self.logic_score + self.charisma_score + self.risk_score
    }
}

/// Binary verdict on a defended case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "successful defense")]
    SuccessfulDefense,
    #[serde(rename = "failed defense")]
    FailedDefense,
}

impl Outcome {
    pub fn from_score(score: i32) -> Self {
        if score >= SUCCESS_THRESHOLD {
            Outcome::SuccessfulDefense
        } else {
            Outcome::FailedDefense
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::SuccessfulDefense => "successful defense",
            Outcome::FailedDefense => "failed defense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "successful defense" => Some(Outcome::SuccessfulDefense),
            "failed defense" => Some(Outcome::FailedDefense),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::SuccessfulDefense
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeResult {
    pub score: i32,
    pub outcome: Outcome,
}

/// Every intermediate value of one scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaseEvaluation {
    pub breakdown: ScoreBreakdown,
    /// Raw total clamped to 0-100.
    pub base_score: i32,
    /// Base score after probability scaling.
    pub probability_score: i32,
    pub result: OutcomeResult,
}

/// Score a defended case. See [`evaluate_case`] for the intermediate values.
pub fn calculate_case_outcome(
    player: &StatTriple,
    opponent: &StatTriple,
    final_move_risk: RiskLevel,
    success_probability: i32,
    bonus_points: i32,
) -> OutcomeResult {
    evaluate_case(
        player,
        opponent,
        final_move_risk,
        success_probability,
        bonus_points,
    )
    .result
}

pub fn evaluate_case(
    player: &StatTriple,
    opponent: &StatTriple,
    final_move_risk: RiskLevel,
    success_probability: i32,
    bonus_points: i32,
) -> CaseEvaluation {
    let breakdown = ScoreBreakdown::compute(player, opponent, final_move_risk);
    tracing::debug!(
        stage = "stats",
        player_logic = player.logic,
        opponent_logic = opponent.logic,
        logic_score = breakdown.logic_score,
        player_charisma = player.charisma,
        opponent_charisma = opponent.charisma,
        charisma_score = breakdown.charisma_score,
        "compared stats"
    );
    tracing::debug!(
        stage = "risk",
        opponent_risk = opponent.risk,
        stance = ?Stance::of(opponent),
        final_move_risk = %final_move_risk,
        risk_score = breakdown.risk_score,
        "scored risk alignment"
    );

    let raw = breakdown.raw_total();
    let base_score = raw.clamp(MIN_SCORE, MAX_SCORE);

    let probability_score = apply_probability(base_score, success_probability);
    tracing::debug!(
        stage = "probability",
        raw,
        base_score,
        success_probability,
        factor = probability_factor(success_probability),
        probability_score,
        "scaled by move probability"
    );

    let boosted = apply_bonus(probability_score, bonus_points);
    let score = boosted.clamp(MIN_SCORE as i64, MAX_SCORE as i64) as i32;
    let outcome = Outcome::from_score(score);
    tracing::debug!(
        stage = "bonus",
        bonus_points,
        before = probability_score,
        boosted,
        score,
        outcome = %outcome,
        "applied power-up bonus"
    );

    CaseEvaluation {
        breakdown,
        base_score,
        probability_score,
        result: OutcomeResult { score, outcome },
    }
}

/// The probability multiplier, 0.7 at 0% up to 1.0 at 100%.
pub fn probability_factor(success_probability: i32) -> f64 {
    0.7 + (success_probability as f64 / 100.0) * 0.3
}

fn stat_component(player: i32, opponent: i32) -> i32 {
    let diff = player as i64 - opponent as i64;
    let adjustment = (diff * STAT_DIFF_WEIGHT).clamp(STAT_ADJUST_MIN, STAT_ADJUST_MAX);
    (STAT_BASE + adjustment) as i32
}

/// `round(base * (0.7 + p/100 * 0.3))`, computed exactly.
fn apply_probability(base_score: i32, success_probability: i32) -> i32 {
    let factor_milli =
        PROBABILITY_FLOOR_MILLI + PROBABILITY_SLOPE_MILLI * success_probability as i64;
    round_ratio(base_score as i64 * factor_milli, 1000) as i32
}

/// `round(score * (1 + b/100) + round(b * 1.5))`, unclamped.
fn apply_bonus(score: i32, bonus_points: i32) -> i64 {
    let bonus = bonus_points as i64;
    let addend = round_ratio(3 * bonus, 2);
    round_ratio(score as i64 * (100 + bonus) + 100 * addend, 100)
}

/// Round-half-up of `num / den` for `den > 0`, i.e. `floor(num/den + 0.5)`.
fn round_ratio(num: i64, den: i64) -> i64 {
    (2 * num + den).div_euclid(2 * den)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> StatTriple {
        StatTriple::new(8, 6, 7)
    }

    fn aggressive_opponent() -> StatTriple {
        StatTriple::new(6, 6, 8)
    }

    #[test]
    fn test_aggressive_opponent_high_risk_move() {
        let eval = evaluate_case(&player(), &aggressive_opponent(), RiskLevel::High, 40, 0);
        assert_eq!(eval.breakdown.logic_score, 29);
        assert_eq!(eval.breakdown.charisma_score, 25);
        assert_eq!(eval.breakdown.risk_score, 30);
        assert_eq!(eval.base_score, 84);
        assert_eq!(eval.probability_score, 69);
        assert_eq!(eval.result.score, 69);
        assert_eq!(eval.result.outcome, Outcome::SuccessfulDefense);
    }

    #[test]
    fn test_aggressive_opponent_low_risk_move() {
        let eval = evaluate_case(&player(), &aggressive_opponent(), RiskLevel::Low, 40, 0);
        assert_eq!(eval.breakdown.risk_score, 5);
        assert_eq!(eval.base_score, 59);
        assert_eq!(eval.result.score, 48);
        assert_eq!(eval.result.outcome, Outcome::FailedDefense);
    }

    #[test]
    fn test_full_bonus_clamps_to_max() {
        assert_eq!(apply_bonus(69, 15), 102); // 69 * 1.15 + 23 = 102.35
        let result =
            calculate_case_outcome(&player(), &aggressive_opponent(), RiskLevel::High, 40, 15);
        assert_eq!(result.score, 100);
        assert_eq!(result.outcome, Outcome::SuccessfulDefense);
    }

    #[test]
    fn test_bonus_addend_rounds_half_up() {
        // round(15 * 1.5) = round(22.5) = 23
        assert_eq!(apply_bonus(0, 15), 23);
        // round(1 * 1.5) = 2
        assert_eq!(apply_bonus(0, 1), 2);
    }

    #[test]
    fn test_zero_bonus_is_noop() {
        for score in 0..=100 {
            assert_eq!(apply_bonus(score, 0), score as i64);
        }
    }

    #[test]
    fn test_full_probability_is_noop() {
        for base in 0..=100 {
            assert_eq!(apply_probability(base, 100), base);
        }
        assert!((probability_factor(100) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_probability_never_increases_score() {
        for base in 0..=100 {
            for p in 0..=100 {
                let scaled = apply_probability(base, p);
                assert!(scaled <= base);
                assert!(scaled * 10 >= base * 7 - 5);
            }
        }
    }

    #[test]
    fn test_risk_matrix() {
        let conservative = StatTriple::new(5, 5, 6);
        let aggressive = StatTriple::new(5, 5, 7);
        assert_eq!(Stance::of(&conservative), Stance::Conservative);
        assert_eq!(Stance::of(&aggressive), Stance::Aggressive);

        let risk = |opp: &StatTriple, r| ScoreBreakdown::compute(&player(), opp, r).risk_score;
        assert_eq!(risk(&aggressive, RiskLevel::High), 30);
        assert_eq!(risk(&aggressive, RiskLevel::Low), 5);
        assert_eq!(risk(&conservative, RiskLevel::Low), 25);
        assert_eq!(risk(&conservative, RiskLevel::High), 15);
    }

    #[test]
    fn test_stat_component_clamps() {
        assert_eq!(stat_component(10, 1), 35); // +18 capped at +10
        assert_eq!(stat_component(1, 10), 10); // -18 capped at -15
        assert_eq!(stat_component(5, 5), 25);
        assert_eq!(stat_component(6, 8), 21);
    }

    #[test]
    fn test_score_always_in_range() {
        for pl in 1..=10 {
            for ol in 1..=10 {
                for orisk in [1, 6, 7, 10] {
                    for risk in [RiskLevel::High, RiskLevel::Low] {
                        for p in [0, 33, 50, 100] {
                            for b in [0, 7, 15] {
                                let r = calculate_case_outcome(
                                    &StatTriple::new(pl, pl, 5),
                                    &StatTriple::new(ol, ol, orisk),
                                    risk,
                                    p,
                                    b,
                                );
                                assert!((MIN_SCORE..=MAX_SCORE).contains(&r.score));
                                assert_eq!(r.outcome.is_success(), r.score >= SUCCESS_THRESHOLD);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_logic_monotonic() {
        let opp = aggressive_opponent();
        let mut prev = i32::MIN;
        for logic in 1..=10 {
            let b = ScoreBreakdown::compute(&StatTriple::new(logic, 6, 7), &opp, RiskLevel::High);
            assert!(b.logic_score >= prev);
            prev = b.logic_score;
        }
    }

    #[test]
    fn test_probability_monotonic() {
        for base in 0..=100 {
            for p in 0..100 {
                assert!(apply_probability(base, p) <= apply_probability(base, p + 1));
            }
        }
    }

    #[test]
    fn test_bonus_monotonic() {
        let opp = aggressive_opponent();
        for p in [0, 40, 100] {
            let mut prev = MIN_SCORE;
            for b in 0..=15 {
                let r = calculate_case_outcome(&player(), &opp, RiskLevel::Low, p, b);
                assert!(r.score >= prev);
                prev = r.score;
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = evaluate_case(&player(), &aggressive_opponent(), RiskLevel::High, 73, 9);
        let b = evaluate_case(&player(), &aggressive_opponent(), RiskLevel::High, 73, 9);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.result).unwrap(),
            serde_json::to_string(&b.result).unwrap()
        );
    }

    #[test]
    fn test_out_of_convention_inputs_are_scored() {
        let r = calculate_case_outcome(
            &StatTriple::new(50, -3, 0),
            &StatTriple::new(0, 40, 99),
            RiskLevel::High,
            250,
            -20,
        );
        assert!((MIN_SCORE..=MAX_SCORE).contains(&r.score));
    }

    #[test]
    fn test_outcome_serde_labels() {
        let r = OutcomeResult {
            score: 60,
            outcome: Outcome::from_score(60),
        };
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["outcome"], "successful defense");
        assert_eq!(Outcome::from_score(59).as_str(), "failed defense");
        assert_eq!(Outcome::parse("failed defense"), Some(Outcome::FailedDefense));
        assert_eq!(Outcome::parse("won"), None);
    }
}
