//! Intel Connector - Main Entry Point
//!
//! Usage: `intel-connector [--once]`
//!
//! Without `--once` cycles run every `CONNECTOR_DURATION_PERIOD` seconds
//! until Ctrl-C.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intel_connector::config::{ConnectorConfig, FeedKind};
use intel_connector::constants;
use intel_connector::error::ConnectorResult;
use intel_connector::logic::emitter::BundleEmitter;
use intel_connector::logic::normalizer::Normalizer;
use intel_connector::logic::platform::{HttpPlatform, LocalPlatform, PlatformClient};
use intel_connector::logic::scheduler::Scheduler;
use intel_connector::logic::source::{JsonFeedSource, SourceClient, TextFeedSource};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "intel_connector=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Validated config plus the normalizer built from it
fn load() -> ConnectorResult<(ConnectorConfig, Normalizer)> {
    let (config, normalizer) = load()?;
    let normalizer = Normalizer::new(config.source_config())?;
    Ok((config, normalizer))
}

fn build_sources(config: &ConnectorConfig) -> anyhow::Result<Vec<Arc<dyn SourceClient>>> {
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();

    for feed in &config.feeds {
        let source: Arc<dyn SourceClient> = match feed.kind {
            FeedKind::Json => Arc::new(JsonFeedSource::new(
                feed.name.clone(),
                feed.url.clone(),
                config.source_api_key.clone(),
                config.call_timeout(),
            )?),
            FeedKind::Text(kind) => Arc::new(TextFeedSource::new(
                feed.name.clone(),
                feed.url.clone(),
                kind,
                config.call_timeout(),
            )?),
        };
        tracing::info!("Feed '{}' -> {}", feed.name, feed.url);
        sources.push(source);
    }

    Ok(sources)
}

fn build_platform(config: &ConnectorConfig) -> anyhow::Result<Arc<dyn PlatformClient>> {
    if config.dry_run {
        tracing::info!("Dry run: writing bundles under {:?}", config.state_dir);
        let platform = LocalPlatform::new(config.state_dir.clone())
            .with_context(|| format!("cannot create state dir {:?}", config.state_dir))?;
        Ok(Arc::new(platform))
    } else {
        tracing::info!("Platform: {}", config.platform_url);
        Ok(Arc::new(HttpPlatform::new(config.platform_config())?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    init_logging();

    let once = std::env::args().any(|a| a == "--once");
    let (config, normalizer) = load()?;

    tracing::info!("{} v{} starting...", constants::APP_NAME, constants::APP_VERSION);
    tracing::info!(
        "Connector '{}' ({}), period {}s, min score {}, TLP {}",
        config.name,
        config.connector_id,
        config.duration_period,
        config.min_score,
        config.tlp.as_str()
    );

    let sources = build_sources(&config)?;
    let platform = build_platform(&config)?;
    let normalizer = Arc::new(normalizer);
    let emitter = BundleEmitter::new(config.batch_size, config.call_timeout());

    let scheduler = Scheduler::new(
        config.scheduler_config(),
        sources,
        platform,
        normalizer,
        emitter,
    );

    if once {
        let report = scheduler.run_cycle().await?;
        tracing::info!(
            "Cycle done: {} objects, {} relationships, {} accepted, committed={}",
            report.objects,
            report.relationships,
            report.accepted,
            report.is_committed()
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    tracing::info!("Connector stopped");
    Ok(())
}
