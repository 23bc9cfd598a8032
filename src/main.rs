//! LocalHaven CMS Survey Service
//!
//! Collects survey responses and serves results to the admin dashboard.
//!
//! Usage:
//!   haven-survey [OPTIONS]
//!
//! Options:
//!   --port <PORT>   API port (default: 8090, env PORT)
//!   --db <PATH>     SQLite file (default: data/localhavencms.db, env DATABASE_PATH)
//!
//! JWT_SECRET, ADMIN_USERNAME and ADMIN_PASSWORD must be set.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use haven_survey::{
    api::{self, rate_limit, AppContext, AppState},
    auth::AuthGate,
    cache::ResultsCache,
    config::{self, Config, Environment},
    storage::Storage,
    survey::SurveyService,
};

const RATE_LIMIT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

fn init_logging(environment: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(environment.default_log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if environment.is_production() {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may set ENVIRONMENT and RUST_LOG, so it is read before logging starts
    let dotenv = config::load_dotenv();
    init_logging(Environment::from_env());
    match dotenv {
        Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => warn!("No .env file loaded ({}), using environment variables", e),
    }

    let config = Config::load().context("Failed to load configuration")?;

    println!(r#"
    ╔═══════════════════════════════════════════════════════════╗
    ║                                                           ║
    ║   📋  LOCALHAVEN CMS SURVEY SERVICE                       ║
    ║       Product research collection                         ║
    ║                                                           ║
    ╚═══════════════════════════════════════════════════════════╝
    "#);

    info!("Starting survey service...");
    info!("  Environment: {}", config.environment);
    info!("  API Port: {}", config.port);
    info!("  Database: {}", config.database_path.display());
    info!("  Results cache TTL: {}s", config.cache_ttl.as_secs());
    info!("  Trusted proxies: {}", config.trusted_proxies);

    let storage = Storage::open(&config.database_path).with_context(|| {
        format!("Failed to open database at {}", config.database_path.display())
    })?;

    let surveys = SurveyService::new(Arc::new(storage), ResultsCache::new(config.cache_ttl));
    let auth = AuthGate::new(&config.admin_username, &config.admin_password, &config.jwt_secret)
        .with_failure_delay(config.login_failure_delay);
    let state: AppState = Arc::new(AppContext::new(surveys, auth));

    // Spawn idle-key sweep for the limiters
    let limits = if config.rate_limit_disabled {
        warn!("⚠️ Rate limiting disabled (preview deployment)");
        None
    } else {
        let limits = rate_limit::RateLimits::default();
        rate_limit::spawn_cleanup_task(limits.clone(), RATE_LIMIT_SWEEP_PERIOD);
        info!("  Rate limits: 60/min global, 5/min survey, 3/min login");
        Some(limits)
    };

    // Start API server
    let addr = format!("0.0.0.0:{}", config.port);
    api::start_server(state, limits, config.trusted_proxies.clone(), &addr).await?;

    info!("Survey service stopped");
    Ok(())
}
