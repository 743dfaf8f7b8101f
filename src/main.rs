use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use legal_battle_backend::api::{self, AppState};
use legal_battle_backend::catalog::Catalog;
use legal_battle_backend::config::Config;
use legal_battle_backend::db::Database;
use legal_battle_backend::metrics;
use legal_battle_backend::narrative::llm::OpenAiClient;
use legal_battle_backend::narrative::NarrativeService;
use legal_battle_backend::rate_limit::RateLimiter;
use legal_battle_backend::session::SessionStore;

/// How often expired match sessions are dropped.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,legal_battle_backend=debug")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    metrics::register_metrics();

    let db = Arc::new(Database::new(&config.database_url).await?);
    let catalog = Arc::new(Catalog::builtin()?);

    if config.llm_api_key.is_none() {
        tracing::warn!("No LLM_API_KEY or OPENAI_API_KEY set; generated narrative will fail");
    }
    let llm = OpenAiClient::new(
        &config.llm_base_url,
        &config.llm_model,
        config.llm_api_key.clone(),
        config.llm_timeout,
    );
    tracing::info!(model = llm.model(), base_url = %config.llm_base_url, "LLM client ready");
    let narrative = Arc::new(NarrativeService::new(
        Arc::new(llm),
        config.options_cache_ttl,
    ));

    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    spawn_session_sweeper(sessions.clone());

    let rate_limiter = if config.rate_limit_disabled {
        tracing::info!("Rate limiting disabled");
        RateLimiter::disabled()
    } else {
        RateLimiter::new()
    };

    let state = AppState {
        db,
        catalog,
        narrative,
        sessions,
        rate_limiter,
    };
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Legal battle backend listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_session_sweeper(sessions: Arc<SessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired match sessions");
            }
        }
    });
}
