use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryQueryStore};
use crate::routes::with_query_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use recruit_query::config::AppConfig;
use recruit_query::error::AppError;
use recruit_query::queries::{HttpScoringSource, QueryService, TokenVerifier};
use recruit_query::telemetry;
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

    let store = Arc::new(InMemoryQueryStore::default());
    let scoring = Arc::new(HttpScoringSource::new(&config.scoring)?);
    let service = Arc::new(QueryService::new(store, scoring));
    let verifier = Arc::new(TokenVerifier::new(&config.auth.jwt_secret));

    let app = with_query_routes(service, verifier)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        scoring = %config.scoring.base_url,
        "recruit query service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
