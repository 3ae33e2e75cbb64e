use crate::cli::ServeArgs;
use crate::infra::{seeded_repository, AppState};
use crate::routes::with_tender_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tender_desk::config::AppConfig;
use tender_desk::error::AppError;
use tender_desk::telemetry;
use tender_desk::workflows::tender::TenderWorkflowService;
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

    let repository = Arc::new(seeded_repository(args.seed.as_deref())?);
    if let Some(seed) = &args.seed {
        info!(seed = %seed.display(), "tender store seeded");
    }
    let service = Arc::new(TenderWorkflowService::new(repository, config.workflow));

    let app = with_tender_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "tender desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
