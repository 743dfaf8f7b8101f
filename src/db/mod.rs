// Database access layer (SQLite via sqlx).

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::scoring::{Outcome, StatTriple, MAX_SCORE, MIN_SCORE};

/// Starting value for each stat of a newly registered user.
pub const DEFAULT_USER_STAT: i32 = 5;
/// How many scores the stats summary lists.
const RECENT_SCORES: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("User {0} not found")]
    UnknownUser(i64),
    #[error("A user with email {0} already exists")]
    DuplicateEmail(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub company_name: Option<String>,
    pub role: Option<String>,
    pub logic_score: i32,
    pub charisma_score: i32,
    pub risk_score: i32,
    pub created_at: String,
}

impl User {
    pub fn stats(&self) -> StatTriple {
        StatTriple::new(self.logic_score, self.charisma_score, self.risk_score)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Score {
    pub id: i64,
    pub user_id: i64,
    pub scenario_id: i64,
    pub score: i32,
    pub outcome: String,
    pub logic_score: Option<i32>,
    pub charisma_score: Option<i32>,
    pub risk_score: Option<i32>,
    pub created_at: String,
}

/// A score as submitted. `outcome` is the display label and is checked
/// against [`Outcome`] before insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewScore {
    pub user_id: i64,
    pub scenario_id: i64,
    pub score: i32,
    pub outcome: String,
    #[serde(default)]
    pub logic_score: Option<i32>,
    #[serde(default)]
    pub charisma_score: Option<i32>,
    #[serde(default)]
    pub risk_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: i64,
    pub player_name: String,
    pub scenario_id: i64,
    pub score: i32,
    pub outcome: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecentScore {
    pub score: i32,
    pub outcome: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total_games: i64,
    pub average_score: f64,
    /// Percentage of games that ended in a successful defense.
    pub success_rate: f64,
    pub highest_score: i32,
    pub current_stats: StatTriple,
    pub recent_scores: Vec<RecentScore>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Every connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                company_name TEXT,
                role TEXT,
                logic_score INTEGER NOT NULL DEFAULT 5,
                charisma_score INTEGER NOT NULL DEFAULT 5,
                risk_score INTEGER NOT NULL DEFAULT 5,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                scenario_id INTEGER NOT NULL,
                score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
                outcome TEXT NOT NULL CHECK (outcome IN ('successful defense', 'failed defense')),
                logic_score INTEGER,
                charisma_score INTEGER,
                risk_score INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_user ON scores(user_id, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_score ON scores(score DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub async fn create_user(&self, new: &NewUser) -> Result<User, DbError> {
        if new.name.trim().is_empty() || new.email.trim().is_empty() {
            return Err(DbError::InvalidInput("Name and email are required".to_string()));
        }

        let row = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email, company_name, role, logic_score, charisma_score, risk_score) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING id, name, email, company_name, role, logic_score, charisma_score, risk_score, created_at",
        )
        .bind(new.name.trim())
        .bind(new.email.trim())
        .bind(&new.company_name)
        .bind(&new.role)
        .bind(DEFAULT_USER_STAT)
        .bind(DEFAULT_USER_STAT)
        .bind(DEFAULT_USER_STAT)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Concurrent signups race to the UNIQUE constraint.
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DbError::DuplicateEmail(new.email.trim().to_string())
            }
            other => DbError::Sqlx(other),
        })?;
        tracing::info!(user_id = row.id, "Created user");
        Ok(row)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, company_name, role, logic_score, charisma_score, risk_score, created_at \
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, company_name, role, logic_score, charisma_score, risk_score, created_at \
             FROM users WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
    }

    /// Overwrite a user's persona stats. Returns `None` for an unknown user.
    pub async fn update_user_stats(
        &self,
        id: i64,
        stats: &StatTriple,
    ) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET logic_score = ?, charisma_score = ?, risk_score = ? WHERE id = ?",
        )
        .bind(stats.logic)
        .bind(stats.charisma)
        .bind(stats.risk)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user(id).await
    }

    // ── Scores ────────────────────────────────────────────────────────

    pub async fn save_score(&self, new: &NewScore) -> Result<Score, DbError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&new.score) {
            return Err(DbError::InvalidInput(format!(
                "Score must be between {MIN_SCORE} and {MAX_SCORE}"
            )));
        }
        let outcome = Outcome::parse(&new.outcome)
            .ok_or_else(|| DbError::InvalidInput("Invalid outcome value".to_string()))?;
        if outcome != Outcome::from_score(new.score) {
            return Err(DbError::InvalidInput(format!(
                "Outcome \"{}\" does not match score {}",
                outcome, new.score
            )));
        }
        if self.get_user(new.user_id).await?.is_none() {
            return Err(DbError::UnknownUser(new.user_id));
        }

        let row = sqlx::query_as::<_, Score>(
            "INSERT INTO scores (user_id, scenario_id, score, outcome, logic_score, charisma_score, risk_score) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING id, user_id, scenario_id, score, outcome, logic_score, charisma_score, risk_score, created_at",
        )
        .bind(new.user_id)
        .bind(new.scenario_id)
        .bind(new.score)
        .bind(outcome.as_str())
        .bind(new.logic_score)
        .bind(new.charisma_score)
        .bind(new.risk_score)
        .fetch_one(&self.pool)
        .await?;
        tracing::debug!(score_id = row.id, user_id = row.user_id, score = row.score, "Saved score");
        Ok(row)
    }

    /// A user's scores, newest first.
    pub async fn list_user_scores(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Score>, sqlx::Error> {
        sqlx::query_as::<_, Score>(
            "SELECT id, user_id, scenario_id, score, outcome, logic_score, charisma_score, risk_score, created_at \
             FROM scores WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_user_scores(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM scores WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Highest scores across all users; equal scores rank the earlier one first.
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT s.id, s.user_id, u.name AS player_name, s.scenario_id, s.score, s.outcome, s.created_at \
             FROM scores s JOIN users u ON u.id = s.user_id \
             ORDER BY s.score DESC, s.created_at ASC, s.id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Aggregates over every score a user has recorded. `None` for an
    /// unknown user.
    pub async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, sqlx::Error> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };

        let (total_games, average, successes, highest): (i64, Option<f64>, Option<i64>, Option<i64>) =
            sqlx::query_as(
                "SELECT COUNT(*), AVG(score), \
                 SUM(CASE WHEN outcome = 'successful defense' THEN 1 ELSE 0 END), MAX(score) \
                 FROM scores WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let recent_scores = sqlx::query_as::<_, RecentScore>(
            "SELECT score, outcome, created_at AS date FROM scores \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(RECENT_SCORES)
        .fetch_all(&self.pool)
        .await?;

        let success_rate = if total_games > 0 {
            successes.unwrap_or(0) as f64 / total_games as f64 * 100.0
        } else {
            0.0
        };

        Ok(Some(UserStats {
            total_games,
            average_score: average.unwrap_or(0.0),
            success_rate,
            highest_score: highest.unwrap_or(0) as i32,
            current_stats: user.stats(),
            recent_scores,
        }))
    }
}
