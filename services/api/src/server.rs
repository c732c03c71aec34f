use crate::cli::ServeArgs;
use crate::infra::{seed_demo_records, AllowListOverrideGate, AppState, InMemoryPermitRepository};
use crate::routes::with_permit_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use curbside::config::AppConfig;
use curbside::error::AppError;
use curbside::permits::PermitService;
use curbside::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryPermitRepository::default());
    seed_demo_records(&repository);
    let gate = Arc::new(
        AllowListOverrideGate::default().with_grant("property-manager", "board-approved"),
    );
    let permit_service = Arc::new(PermitService::new(repository, gate));

    let app = with_permit_routes(permit_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "permit desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
