//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use axum::Router;
use peerhost_core::config::TransitConfig;
use peerhost_core::Config;
use peerhost_storage::LocalDriveFileSystem;
use peerhost_transit::{
    ConnectedSenderFilter, EventBus, FilterPipeline, PartSizeFilter, PartSizeLimits,
    SenderRateLimitFilter, SharedSecretKeyExchange, SqliteInbox, TransferStateTracker,
    TransitFileWriter, TransitPerimeterService,
};
use peerhost_worker::{InboxProcessor, InboxWorker, InboxWorkerConfig};
use std::sync::Arc;

/// Everything `main` needs to serve and shut down.
pub struct App {
    pub state: Arc<AppState>,
    pub router: Router,
    pub worker: InboxWorker,
}

/// Shared services built from configuration.
pub struct Services {
    pub state: Arc<AppState>,
    pub processor: Arc<InboxProcessor>,
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<App> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_json())?;
    tracing::info!(
        environment = %config.environment(),
        data_dir = %config.data_dir().display(),
        "Configuration loaded and validated successfully"
    );

    let services = build_services(&config).await?;

    let worker = InboxWorker::start(
        services.processor.clone(),
        &services.state.events,
        InboxWorkerConfig::from(config.inbox_worker()),
    );

    let router = routes::setup_routes(&config, services.state.clone());

    Ok(App {
        state: services.state,
        router,
        worker,
    })
}

/// Open storage and the inbox, and wire the perimeter and the inbox processor.
pub async fn build_services(config: &Config) -> Result<Services> {
    let transit = config.transit();

    let drives = Arc::new(
        LocalDriveFileSystem::new(config.data_dir().clone())
            .await
            .context("Failed to open drive storage")?,
    );
    let inbox = Arc::new(
        SqliteInbox::open(config.inbox_database_path())
            .await
            .context("Failed to open inbox database")?,
    );
    let key_exchange = Arc::new(
        SharedSecretKeyExchange::new(
            transit.shared_secret.expose(),
            transit.public_key_crcs.clone(),
        )
        .context("Failed to set up key exchange")?,
    );
    let events = EventBus::new();

    let perimeter = TransitPerimeterService::new(
        Arc::new(TransferStateTracker::new()),
        build_filter_pipeline(transit),
        key_exchange.clone(),
        drives.clone(),
        inbox.clone(),
        events.clone(),
    )
    .with_retain_quarantined(transit.retain_quarantined);

    let writer = Arc::new(TransitFileWriter::new(drives.clone(), events.clone()));
    let processor = Arc::new(InboxProcessor::new(
        inbox.clone(),
        writer,
        key_exchange,
        drives.clone(),
        config.inbox_worker().max_attempts,
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        perimeter,
        drives,
        inbox,
        events,
    });

    Ok(Services { state, processor })
}

/// First-stage filters, cheapest first.
pub fn build_filter_pipeline(transit: &TransitConfig) -> FilterPipeline {
    let mut pipeline = FilterPipeline::new();

    if !transit.allowed_senders.is_empty() {
        pipeline.push(Arc::new(ConnectedSenderFilter::new(
            transit.allowed_senders.iter().cloned(),
        )));
    }
    if transit.sender_rate_limit_per_minute > 0 {
        pipeline.push(Arc::new(SenderRateLimitFilter::new(
            transit.sender_rate_limit_per_minute,
        )));
    }
    pipeline.push(Arc::new(PartSizeFilter::new(PartSizeLimits::from_config(
        transit,
    ))));

    #[cfg(feature = "clamav")]
    if transit.clamav_enabled {
        use peerhost_transit::{ClamAvScanner, MalwareScanFilter};
        let scanner = ClamAvScanner::new(transit.clamav_host.clone(), transit.clamav_port);
        pipeline.push(Arc::new(MalwareScanFilter::new(
            scanner,
            transit.clamav_fail_closed,
        )));
    }
    #[cfg(not(feature = "clamav"))]
    if transit.clamav_enabled {
        tracing::warn!("CLAMAV_ENABLED is set but the clamav feature is not compiled in");
    }

    tracing::info!(filters = ?pipeline.filter_ids(), "Filter pipeline built");
    pipeline
}
