use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use repteam_adapters::{
    NoopNotifier, TurnstileVerifier, UnconfiguredVerifier, WorkflowWebhookNotifier,
};
use repteam_core::{
    ApplicationNotifier, BonusTier, RateLimitConfig, RepStoreConfig, ScoringConfig, TokenVerifier,
    ViewConfig,
};
use repteam_service::{build_router, ServiceConfig, ServiceState};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "repteamd", version, about = "Rep application intake and leaderboard REST service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StoreMode::Auto, env = "REPTEAM_STORE")]
    store: StoreMode,
    /// PostgreSQL url for rep and sale persistence.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "REPTEAM_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Cloudflare Turnstile secret. Submissions fail closed without it.
    #[arg(long, env = "TURNSTILE_SECRET_KEY")]
    turnstile_secret: Option<String>,
    /// Workflow webhook accepted applications are forwarded to.
    #[arg(long, env = "APPLICATION_WEBHOOK_URL")]
    webhook_url: Option<String>,
    /// Landing page the referral links point at.
    #[arg(long, default_value = "http://localhost:3000", env = "LANDING_PAGE_URL")]
    landing_url: String,
    /// Submissions allowed per address per window.
    #[arg(long, default_value_t = 3, env = "REPTEAM_RATE_LIMIT_MAX")]
    rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    #[arg(long, default_value_t = 600, env = "REPTEAM_RATE_LIMIT_WINDOW_SECS")]
    rate_limit_window_secs: u64,
    /// Points per shirt sold.
    #[arg(long, default_value_t = 2)]
    points_per_shirt: u64,
    /// Points per ticket sold.
    #[arg(long, default_value_t = 1)]
    points_per_ticket: u64,
    /// Commission dollars per shirt sold.
    #[arg(long, default_value_t = 5)]
    commission_per_shirt: i64,
    /// Commission dollars per ticket sold.
    #[arg(long, default_value_t = 3)]
    commission_per_ticket: i64,
    /// Bonus tier as <units>:<reward>, repeatable. Unset keeps the stock tiers.
    #[arg(long = "bonus-tier", value_parser = parse_bonus_tier)]
    bonus_tiers: Vec<BonusTier>,
}

fn parse_bonus_tier(value: &str) -> Result<BonusTier, String> {
    let (units, reward) = value
        .split_once(':')
        .ok_or_else(|| "expected <units>:<reward>".to_string())?;
    let units: u64 = units
        .trim()
        .parse()
        .map_err(|e| format!("invalid tier units '{units}': {e}"))?;
    let reward = reward.trim();
    if reward.is_empty() {
        return Err("tier reward must not be empty".to_string());
    }
    Ok(BonusTier::new(units, reward))
}

fn resolve_bonus_tiers(cli: &Cli) -> Vec<BonusTier> {
    if cli.bonus_tiers.is_empty() {
        ScoringConfig::default().bonus_tiers
    } else {
        cli.bonus_tiers.clone()
    }
}

fn resolve_store(cli: &Cli) -> anyhow::Result<RepStoreConfig> {
    let resolved_url = cli.database_url.clone();

    let store = match cli.store {
        StoreMode::Memory => RepStoreConfig::Memory,
        StoreMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("store=postgres requires --database-url or DATABASE_URL")
            })?;
            RepStoreConfig::postgres(database_url, cli.pg_max_connections)
        }
        StoreMode::Auto => {
            if let Some(database_url) = resolved_url {
                RepStoreConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                RepStoreConfig::Memory
            }
        }
    };

    Ok(store)
}

fn resolve_verifier(cli: &Cli) -> anyhow::Result<Arc<dyn TokenVerifier>> {
    match cli.turnstile_secret.as_deref() {
        Some(secret) if !secret.trim().is_empty() => {
            Ok(Arc::new(TurnstileVerifier::new(secret.trim())?))
        }
        _ => {
            warn!("TURNSTILE_SECRET_KEY not configured; all submissions will be rejected");
            Ok(Arc::new(UnconfiguredVerifier))
        }
    }
}

fn resolve_notifier(cli: &Cli) -> anyhow::Result<Arc<dyn ApplicationNotifier>> {
    match cli.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            Ok(Arc::new(WorkflowWebhookNotifier::new(url.trim())?))
        }
        _ => {
            warn!("APPLICATION_WEBHOOK_URL not configured; accepted applications are not forwarded");
            Ok(Arc::new(NoopNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "repteam_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();

    let store = resolve_store(&cli)?;
    info!("using {} store", store.label());

    let config = ServiceConfig {
        store,
        rate_limit: RateLimitConfig {
            max_requests: cli.rate_limit_max,
            window: Duration::from_secs(cli.rate_limit_window_secs),
        },
        scoring: ScoringConfig {
            points_per_shirt: cli.points_per_shirt,
            points_per_ticket: cli.points_per_ticket,
            commission_per_shirt: cli.commission_per_shirt,
            commission_per_ticket: cli.commission_per_ticket,
            bonus_tiers: resolve_bonus_tiers(&cli),
        },
        views: ViewConfig {
            landing_url: cli.landing_url.clone(),
            ..ViewConfig::default()
        },
        ..ServiceConfig::default()
    };

    let verifier = resolve_verifier(&cli)?;
    let notifier = resolve_notifier(&cli)?;

    let state = ServiceState::bootstrap(config, verifier, notifier).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("repteam-service listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
