use crate::cli::ServeArgs;
use crate::infra::{AppState, MemoryServices, PgServices, Services};
use crate::routes::with_service_routes;
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::NaiveDate;
use institute_core::clock::{Clock, SystemClock};
use institute_core::config::AppConfig;
use institute_core::error::AppError;
use institute_core::storage::{PgStore, SeedData};
use institute_core::telemetry;
use institute_core::workflows::checkin::{CheckInRepository, SessionDirectory};
use institute_core::workflows::enrollment::{BatchRepository, RegistrationLedger};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(seed) = args.seed.take() {
        config.seed_path = Some(seed);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let today = clock.today();
    let routes = if config.database.url.is_some() {
        let store = PgStore::connect(&config.database).await?;
        let services = PgServices::postgres(store, config.allocator, config.review, clock);
        prepare(&config, &services, today).await?
    } else {
        warn!("DATABASE_URL is not set, keeping all state in memory");
        let services = MemoryServices::in_memory(config.allocator, config.review, clock);
        prepare(&config, &services, today).await?
    };

    let app = routes.layer(Extension(app_state)).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        persistent = config.database.url.is_some(),
        batch_capacity = config.allocator.batch_capacity,
        "institute service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Seed the stores when a seed file is configured and mount the service routes.
async fn prepare<B, L, S, C>(
    config: &AppConfig,
    services: &Services<B, L, S, C>,
    today: NaiveDate,
) -> Result<Router, AppError>
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
    S: SessionDirectory + 'static,
    C: CheckInRepository + 'static,
{
    if let Some(path) = &config.seed_path {
        services.load_seed(SeedData::from_path(path)?, today).await?;
    }
    Ok(with_service_routes(services))
}
