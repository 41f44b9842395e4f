use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDirectory, InMemoryRegistry, LoggingNotifier};
use crate::routes::with_registry_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use enterprise_registry::config::AppConfig;
use enterprise_registry::error::AppError;
use enterprise_registry::telemetry;
use enterprise_registry::workflows::registration::{
    RegistryServices, RegistrySettings, SystemClock,
};
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

    let settings = RegistrySettings::from(&config.workflow);
    let clock = SystemClock::with_offset_minutes(config.workflow.utc_offset_minutes);
    let services = Arc::new(RegistryServices::new(
        Arc::new(InMemoryRegistry::default()),
        Arc::new(InMemoryDirectory::default()),
        Arc::new(LoggingNotifier::default()),
        Arc::new(clock),
        settings,
    ));

    let app = with_registry_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        assignment_policy = ?settings.assignment_policy,
        utc_offset_minutes = config.workflow.utc_offset_minutes,
        "enterprise registry ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
