// Server-held match state, one session per playthrough.
//
// A match walks persona -> strategy -> opponent counter -> final move
// options -> chosen move -> verdict. Each step checks that the previous ones
// happened and tells the client where to go back to when they did not.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::catalog::StrategyLevel;
use crate::metrics;
use crate::scoring::{OutcomeResult, RiskLevel, ScoreBreakdown, StatTriple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PersonaCreated,
    StrategySelected,
    CounterIssued,
    MovesOffered,
    FinalMoveChosen,
    /// Claimed by one outcome request; released again if scoring fails.
    Scoring,
    Scored,
}

impl Stage {
    /// Client step that continues a session sitting at this stage.
    pub fn next_step(self) -> &'static str {
        match self {
            Stage::PersonaCreated => "/select-strategy",
            Stage::StrategySelected => "/opponent-counter",
            Stage::CounterIssued | Stage::MovesOffered => "/final-move",
            Stage::FinalMoveChosen | Stage::Scoring => "/case-result",
            Stage::Scored => "/game-complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("match session {0} not found or expired")]
    NotFound(Uuid),
    #[error("match is at stage {at:?}; continue at {redirect}")]
    OutOfOrder { at: Stage, redirect: &'static str },
    #[error("match session is missing {field}")]
    Missing {
        field: &'static str,
        redirect: &'static str,
    },
    #[error("final move {index} does not exist; {available} options were offered")]
    InvalidChoice { index: usize, available: usize },
    #[error("match has already been scored")]
    AlreadyScored,
}

impl SessionError {
    /// Where the client should navigate to recover, if anywhere.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            SessionError::NotFound(_) => Some("/"),
            SessionError::OutOfOrder { redirect, .. } | SessionError::Missing { redirect, .. } => {
                Some(redirect)
            }
            SessionError::AlreadyScored => Some(Stage::Scored.next_step()),
            SessionError::InvalidChoice { .. } => None,
        }
    }
}

/// One of the two final moves offered to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMoveOption {
    pub description: String,
    pub risk: RiskLevel,
    /// Declared chance of success, percent.
    pub probability: i32,
    pub potential_impact: String,
}

/// The verdict stored on a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionVerdict {
    pub result: OutcomeResult,
    pub breakdown: ScoreBreakdown,
    pub score_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSession {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub player_name: String,
    pub player_stats: StatTriple,
    pub scenario_id: i64,
    pub opponent_id: String,
    pub stage: Stage,
    pub strategy: Option<StrategyLevel>,
    pub opponent_counter: Option<String>,
    pub final_moves: Vec<FinalMoveOption>,
    pub final_move: Option<FinalMoveOption>,
    pub bonus_points: i32,
    pub verdict: Option<SessionVerdict>,
    pub created_at: DateTime<Utc>,
}

impl MatchSession {
    pub fn start(
        user_id: Option<i64>,
        player_name: &str,
        player_stats: StatTriple,
        scenario_id: i64,
        opponent_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            player_name: player_name.to_string(),
            player_stats,
            scenario_id,
            opponent_id: opponent_id.to_string(),
            stage: Stage::PersonaCreated,
            strategy: None,
            opponent_counter: None,
            final_moves: Vec::new(),
            final_move: None,
            bonus_points: 0,
            verdict: None,
            created_at: Utc::now(),
        }
    }

    /// Fail unless the session sits at one of `allowed`.
    pub fn ensure_stage(&self, allowed: &[Stage]) -> Result<(), SessionError> {
        if self.stage == Stage::Scored {
            return Err(SessionError::AlreadyScored);
        }
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(SessionError::OutOfOrder {
                at: self.stage,
                redirect: self.stage.next_step(),
            })
        }
    }

    /// Pick (or re-pick, before the opponent answers) the opening strategy.
    pub fn select_strategy(&mut self, level: StrategyLevel) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::PersonaCreated, Stage::StrategySelected])?;
        self.strategy = Some(level);
        self.stage = Stage::StrategySelected;
        Ok(())
    }

    pub fn record_counter(&mut self, counter: String) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::StrategySelected, Stage::CounterIssued])?;
        self.require_strategy()?;
        self.opponent_counter = Some(counter);
        self.stage = Stage::CounterIssued;
        Ok(())
    }

    pub fn offer_moves(&mut self, moves: Vec<FinalMoveOption>) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::CounterIssued, Stage::MovesOffered])?;
        self.require_counter()?;
        self.final_moves = moves;
        self.final_move = None;
        self.stage = Stage::MovesOffered;
        Ok(())
    }

    /// Choose one of the offered moves. Bonus points are validated by the
    /// caller.
    pub fn choose_final_move(&mut self, index: usize, bonus_points: i32) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::MovesOffered, Stage::FinalMoveChosen])?;
        let chosen = self
            .final_moves
            .get(index)
            .cloned()
            .ok_or(SessionError::InvalidChoice {
                index,
                available: self.final_moves.len(),
            })?;
        self.final_move = Some(chosen);
        self.bonus_points = bonus_points;
        self.stage = Stage::FinalMoveChosen;
        Ok(())
    }

    /// Reserve the session for scoring so only one outcome request runs.
    pub fn begin_scoring(&mut self) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::FinalMoveChosen])?;
        self.require_strategy()?;
        self.require_counter()?;
        self.require_final_move()?;
        self.stage = Stage::Scoring;
        Ok(())
    }

    /// Hand a failed scoring attempt back so the client can retry.
    pub fn release_scoring(&mut self) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::Scoring])?;
        self.stage = Stage::FinalMoveChosen;
        Ok(())
    }

    pub fn record_verdict(&mut self, verdict: SessionVerdict) -> Result<(), SessionError> {
        self.ensure_stage(&[Stage::Scoring])?;
        self.require_final_move()?;
        self.verdict = Some(verdict);
        self.stage = Stage::Scored;
        Ok(())
    }

    pub fn require_strategy(&self) -> Result<StrategyLevel, SessionError> {
        self.strategy.ok_or(SessionError::Missing {
            field: "strategy",
            redirect: Stage::PersonaCreated.next_step(),
        })
    }

    pub fn require_counter(&self) -> Result<&str, SessionError> {
        self.opponent_counter
            .as_deref()
            .ok_or(SessionError::Missing {
                field: "opponent_counter",
                redirect: Stage::StrategySelected.next_step(),
            })
    }

    pub fn require_final_move(&self) -> Result<&FinalMoveOption, SessionError> {
        self.final_move.as_ref().ok_or(SessionError::Missing {
            field: "final_move",
            redirect: Stage::MovesOffered.next_step(),
        })
    }
}

/// Live match sessions, expiring after a period of inactivity.
pub struct SessionStore {
    sessions: TtlCache<Uuid, MatchSession>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: TtlCache::new(ttl),
        }
    }

    pub async fn insert(&self, session: MatchSession) {
        self.sessions.insert(session.id, session).await;
        metrics::ACTIVE_SESSIONS.set(self.sessions.len().await as i64);
    }

    pub async fn get(&self, id: Uuid) -> Result<MatchSession, SessionError> {
        self.sessions
            .get(&id)
            .await
            .ok_or(SessionError::NotFound(id))
    }

    /// Apply a transition atomically and return the updated session.
    pub async fn transition<F>(&self, id: Uuid, f: F) -> Result<MatchSession, SessionError>
    where
        F: FnOnce(&mut MatchSession) -> Result<(), SessionError>,
    {
        self.sessions
            .update(&id, |session| f(session).map(|()| session.clone()))
            .await
            .ok_or(SessionError::NotFound(id))?
    }

    /// Drop expired sessions; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let removed = self.sessions.purge_expired().await;
        metrics::ACTIVE_SESSIONS.set(self.sessions.len().await as i64);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MatchSession {
        MatchSession::start(Some(1), "Ada", StatTriple::new(8, 8, 8), 1, "saul-goodman")
    }

    fn moves() -> Vec<FinalMoveOption> {
        vec![
            FinalMoveOption {
                description: "Poison pill".into(),
                risk: RiskLevel::High,
                probability: 40,
                potential_impact: "Blocks the bid".into(),
            },
            FinalMoveOption {
                description: "White knight".into(),
                risk: RiskLevel::Low,
                probability: 75,
                potential_impact: "Friendly merger".into(),
            },
        ]
    }

    fn verdict() -> SessionVerdict {
        SessionVerdict {
            result: OutcomeResult {
                score: 70,
                outcome: crate::scoring::Outcome::SuccessfulDefense,
            },
            breakdown: ScoreBreakdown {
                logic_score: 29,
                charisma_score: 25,
                risk_score: 30,
            },
            score_id: None,
        }
    }

    #[test]
    fn test_full_flow() {
        let mut s = session();
        assert_eq!(s.stage, Stage::PersonaCreated);
        s.select_strategy(StrategyLevel::High).unwrap();
        s.record_counter("Files an injunction.".into()).unwrap();
        s.offer_moves(moves()).unwrap();
        s.choose_final_move(1, 9).unwrap();
        assert_eq!(s.require_final_move().unwrap().risk, RiskLevel::Low);
        assert_eq!(s.bonus_points, 9);
        s.begin_scoring().unwrap();
        s.record_verdict(verdict()).unwrap();
        assert_eq!(s.stage, Stage::Scored);
    }

    #[test]
    fn test_counter_before_strategy_redirects() {
        let mut s = session();
        let err = s.record_counter("too early".into()).unwrap_err();
        assert_eq!(
            err,
            SessionError::OutOfOrder {
                at: Stage::PersonaCreated,
                redirect: "/select-strategy"
            }
        );
        assert_eq!(err.redirect(), Some("/select-strategy"));
    }

    #[test]
    fn test_missing_fields_report_redirect() {
        let s = session();
        match s.require_strategy() {
            Err(SessionError::Missing { field, redirect }) => {
                assert_eq!(field, "strategy");
                assert_eq!(redirect, "/select-strategy");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            s.require_counter(),
            Err(SessionError::Missing {
                redirect: "/opponent-counter",
                ..
            })
        ));
        assert!(matches!(
            s.require_final_move(),
            Err(SessionError::Missing {
                redirect: "/final-move",
                ..
            })
        ));
    }

    #[test]
    fn test_strategy_can_be_changed_before_counter() {
        let mut s = session();
        s.select_strategy(StrategyLevel::Low).unwrap();
        s.select_strategy(StrategyLevel::Medium).unwrap();
        assert_eq!(s.strategy, Some(StrategyLevel::Medium));
        s.record_counter("counter".into()).unwrap();
        assert!(s.select_strategy(StrategyLevel::High).is_err());
    }

    #[test]
    fn test_invalid_move_index() {
        let mut s = session();
        s.select_strategy(StrategyLevel::High).unwrap();
        s.record_counter("counter".into()).unwrap();
        s.offer_moves(moves()).unwrap();
        assert_eq!(
            s.choose_final_move(2, 0),
            Err(SessionError::InvalidChoice {
                index: 2,
                available: 2
            })
        );
        assert_eq!(s.stage, Stage::MovesOffered);
    }

    #[test]
    fn test_scored_session_is_terminal() {
        let mut s = session();
        s.select_strategy(StrategyLevel::High).unwrap();
        s.record_counter("counter".into()).unwrap();
        s.offer_moves(moves()).unwrap();
        s.choose_final_move(0, 0).unwrap();
        s.begin_scoring().unwrap();
        s.record_verdict(verdict()).unwrap();
        assert_eq!(s.record_verdict(verdict()), Err(SessionError::AlreadyScored));
        assert_eq!(s.begin_scoring(), Err(SessionError::AlreadyScored));
        assert_eq!(
            s.select_strategy(StrategyLevel::Low),
            Err(SessionError::AlreadyScored)
        );
    }

    #[test]
    fn test_scoring_claim_is_exclusive() {
        let mut s = session();
        s.select_strategy(StrategyLevel::High).unwrap();
        s.record_counter("counter".into()).unwrap();
        s.offer_moves(moves()).unwrap();
        s.choose_final_move(0, 0).unwrap();

        // A verdict needs the claim first
        assert!(matches!(
            s.record_verdict(verdict()),
            Err(SessionError::OutOfOrder { .. })
        ));

        s.begin_scoring().unwrap();
        assert_eq!(
            s.begin_scoring(),
            Err(SessionError::OutOfOrder {
                at: Stage::Scoring,
                redirect: "/case-result"
            })
        );
        // The move can no longer be swapped mid-scoring
        assert!(s.choose_final_move(1, 0).is_err());

        s.release_scoring().unwrap();
        assert_eq!(s.stage, Stage::FinalMoveChosen);
        assert!(s.release_scoring().is_err());
        s.begin_scoring().unwrap();
        s.record_verdict(verdict()).unwrap();
        assert_eq!(s.stage, Stage::Scored);
    }

    #[tokio::test]
    async fn test_store_scoring_claim_once() {
        let store = SessionStore::new(Duration::from_secs(60));
        let mut s = session();
        s.select_strategy(StrategyLevel::High).unwrap();
        s.record_counter("counter".into()).unwrap();
        s.offer_moves(moves()).unwrap();
        s.choose_final_move(0, 0).unwrap();
        let id = s.id;
        store.insert(s).await;

        let (a, b) = tokio::join!(
            store.transition(id, |s| s.begin_scoring()),
            store.transition(id, |s| s.begin_scoring()),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.get(id).await.unwrap().stage, Stage::Scoring);
    }

    #[tokio::test]
    async fn test_store_transition() {
        let store = SessionStore::new(Duration::from_secs(60));
        let s = session();
        let id = s.id;
        store.insert(s).await;

        let updated = store
            .transition(id, |s| s.select_strategy(StrategyLevel::Low))
            .await
            .unwrap();
        assert_eq!(updated.stage, Stage::StrategySelected);
        assert_eq!(store.get(id).await.unwrap().strategy, Some(StrategyLevel::Low));

        // Failed transitions leave the session untouched
        let err = store
            .transition(id, |s| s.choose_final_move(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::OutOfOrder { .. }));
        assert_eq!(store.get(id).await.unwrap().stage, Stage::StrategySelected);
    }

    #[tokio::test]
    async fn test_store_unknown_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        assert_eq!(store.get(id).await.unwrap_err(), SessionError::NotFound(id));
        assert_eq!(
            store.transition(id, |_| Ok(())).await.unwrap_err(),
            SessionError::NotFound(id)
        );
    }
}
