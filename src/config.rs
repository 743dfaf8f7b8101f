// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::narrative::llm::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Base URL of the OpenAI-compatible text generation API.
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout: Duration,
    /// How long generated strategy options are reused per scenario.
    pub options_cache_ttl: Duration,
    /// How long an idle match session survives.
    pub session_ttl: Duration,
    /// Skip per-user rate limiting.
    pub rate_limit_disabled: bool,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:legal_battle.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `LLM_BASE_URL`, `LLM_MODEL` - text generation endpoint and model
    /// - `LLM_API_KEY` (or `OPENAI_API_KEY`) - bearer token for the endpoint
    /// - `LLM_TIMEOUT_SECS` - per-request timeout (default: 120)
    /// - `OPTIONS_CACHE_TTL_SECS` - strategy options cache lifetime (default: 1800)
    /// - `SESSION_TTL_SECS` - idle match session lifetime (default: 7200)
    /// - `RATE_LIMIT_DISABLED` - set to `true` to turn off rate limiting
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--database-url <URL>` - Override the database URL
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |name| std::env::var(name).ok())
    }

    fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let database_url = Self::parse_cli_value(args, "--database-url")
            .or_else(|| env("DATABASE_URL"))
            .unwrap_or_else(|| "sqlite:legal_battle.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = match Self::parse_cli_value(args, "--port").or_else(|| env("PORT")) {
            Some(v) => parse_value("PORT", &v)?,
            None => 3000,
        };

        let llm_base_url = env("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let llm_model = env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let llm_api_key = env("LLM_API_KEY")
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|k| !k.trim().is_empty());

        let secs = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match env(name) {
                Some(v) => parse_value::<u64>(name, &v).map(Duration::from_secs),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let rate_limit_disabled = env("RATE_LIMIT_DISABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Config {
            database_url,
            port,
            llm_base_url,
            llm_model,
            llm_api_key,
            llm_timeout: secs("LLM_TIMEOUT_SECS", 120)?,
            options_cache_ttl: secs("OPTIONS_CACHE_TTL_SECS", 1800)?,
            session_ttl: secs("SESSION_TTL_SECS", 7200)?,
            rate_limit_disabled,
        })
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}
