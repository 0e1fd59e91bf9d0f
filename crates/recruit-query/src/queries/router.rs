use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::access::Caller;
use super::domain::{Criterion, EventDetails, RecipientId};
use super::identity::TokenVerifier;
use super::repository::QueryStore;
use super::responses::StatusUpdate;
use super::scoring::ScoringSource;
use super::service::{QueryRequest, QueryService, QueryServiceError};

/// Shared state handed to every query handler.
pub struct QueryApi<S, G> {
    pub service: Arc<QueryService<S, G>>,
    pub verifier: Arc<TokenVerifier>,
}

impl<S, G> Clone for QueryApi<S, G> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaRequest {
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRequest {
    pub student_address: RecipientId,
}

/// Router builder exposing the query endpoints.
pub fn query_router<S, G>(service: Arc<QueryService<S, G>>, verifier: Arc<TokenVerifier>) -> Router
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    Router::new()
        .route("/api/v1/queries", post(create_handler::<S, G>))
        .route("/api/v1/queries/dry-run", post(dry_run_handler::<S, G>))
        .route(
            "/api/v1/queries/:query_id",
            get(get_handler::<S, G>).put(update_event_handler::<S, G>),
        )
        .route(
            "/api/v1/queries/:query_id/expand",
            post(expand_handler::<S, G>),
        )
        .route(
            "/api/v1/queries/:query_id/status",
            post(status_handler::<S, G>),
        )
        .route(
            "/api/v1/queries/:query_id/attendance",
            post(attendance_handler::<S, G>),
        )
        .route(
            "/api/v1/queries/:query_id/notify",
            post(notify_handler::<S, G>),
        )
        .route("/api/v1/queries/:query_id/rsvp", get(rsvp_handler::<S, G>))
        .route(
            "/api/v1/customers/:customer_id/queries",
            get(customer_queries_handler::<S, G>),
        )
        .route(
            "/api/v1/students/:student_address/queries",
            get(student_queries_handler::<S, G>),
        )
        .with_state(QueryApi { service, verifier })
}

#[axum::async_trait]
impl<S, G> FromRequestParts<QueryApi<S, G>> for Caller
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        api: &QueryApi<S, G>,
    ) -> Result<Self, Self::Rejection> {
        api.verifier.caller(&parts.headers).map_err(|error| {
            debug!(%error, "bearer token rejected");
            error_response(StatusCode::UNAUTHORIZED, error.to_string())
        })
    }
}

pub(crate) async fn create_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    axum::Json(request): axum::Json<QueryRequest>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(StatusCode::CREATED, api.service.create(&caller, request).await)
}

pub(crate) async fn dry_run_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    axum::Json(request): axum::Json<CriteriaRequest>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service.dry_run(&caller, &request.criteria).await,
    )
}

pub(crate) async fn get_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(StatusCode::OK, api.service.get(&caller, &query_id).await)
}

pub(crate) async fn update_event_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
    axum::Json(patch): axum::Json<EventDetails>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service.update_event(&caller, &query_id, patch).await,
    )
}

pub(crate) async fn expand_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
    axum::Json(request): axum::Json<CriteriaRequest>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service
            .expand(&caller, &query_id, request.criteria)
            .await,
    )
}

pub(crate) async fn status_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
    axum::Json(update): axum::Json<StatusUpdate>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service.update_status(&caller, &query_id, update).await,
    )
}

pub(crate) async fn attendance_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
    axum::Json(request): axum::Json<AttendanceRequest>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service
            .record_attendance(&caller, &query_id, request.student_address)
            .await,
    )
}

pub(crate) async fn notify_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    let result = api
        .service
        .notify(&caller, &query_id)
        .await
        .map(|notified| json!({ "notified": notified }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn rsvp_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(query_id): Path<String>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(StatusCode::OK, api.service.rsvp(&caller, &query_id).await)
}

pub(crate) async fn customer_queries_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(customer_id): Path<String>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    respond(
        StatusCode::OK,
        api.service.customer_queries(&caller, &customer_id).await,
    )
}

pub(crate) async fn student_queries_handler<S, G>(
    caller: Caller,
    State(api): State<QueryApi<S, G>>,
    Path(student_address): Path<String>,
) -> Response
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    let recipient = RecipientId(student_address);
    respond(
        StatusCode::OK,
        api.service.student_queries(&caller, &recipient).await,
    )
}

/// HTTP status reported for each service failure.
pub fn status_for(error: &QueryServiceError) -> StatusCode {
    match error {
        QueryServiceError::NotFound => StatusCode::NOT_FOUND,
        QueryServiceError::ConflictingCriterion(_) => StatusCode::CONFLICT,
        QueryServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        QueryServiceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        QueryServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, QueryServiceError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(status_for(&error), error.to_string()),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}
