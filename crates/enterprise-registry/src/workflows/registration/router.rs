use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    AgentId, Registration, RegistrationId, RegistrationRecord, RegistrationSubmission,
    WorkflowStep,
};
use super::repository::{
    Directory, NotificationSender, Page, PageRequest, RegistrationRepository, SequenceRepository,
};
use super::service::{ErrorClass, RegistrationError, RegistryServices};

type SharedServices<R, D, N> = Arc<RegistryServices<R, D, N>>;

#[derive(Debug, Deserialize)]
pub(crate) struct AgentPayload {
    pub(crate) agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BanPayload {
    #[serde(default)]
    pub(crate) reason: String,
}

/// Router builder exposing the registration workflow over HTTP.
pub fn registration_router<R, D, N>(services: SharedServices<R, D, N>) -> Router
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(create_handler::<R, D, N>))
        .route(
            "/api/v1/registrations/:registration_id",
            get(get_handler::<R, D, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/assignment",
            post(assign_handler::<R, D, N>).delete(unassign_handler::<R, D, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/advance",
            post(advance_handler::<R, D, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/ban",
            post(ban_handler::<R, D, N>).delete(unban_handler::<R, D, N>),
        )
        .route(
            "/api/v1/workflow/steps/:step/unassigned",
            get(unassigned_handler::<R, D, N>),
        )
        .route(
            "/api/v1/agents/:agent_id/registrations",
            get(agent_queue_handler::<R, D, N>),
        )
        .with_state(services)
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = match self.class() {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::Internal => {
                error!(error = %self, "registration workflow failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

pub(crate) async fn create_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Json(submission): Json<RegistrationSubmission>,
) -> Result<(StatusCode, Json<RegistrationRecord>), RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    // Reference allocation may back off between retries; keep it off the async workers.
    let record = tokio::task::spawn_blocking(move || services.registrations.create(submission))
        .await
        .map_err(|join_error| RegistrationError::Interrupted(join_error.to_string()))??;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<RegistrationRecord>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(services.registrations.get(registration_id)?))
}

pub(crate) async fn assign_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
    Json(payload): Json<AgentPayload>,
) -> Result<Json<Registration>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    let registration = services
        .assignments
        .assign_to_agent(registration_id, payload.agent_id)?;
    Ok(Json(registration))
}

pub(crate) async fn unassign_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(services.assignments.unassign(registration_id)?))
}

pub(crate) async fn advance_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
    Json(payload): Json<AgentPayload>,
) -> Result<Json<Registration>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    let registration = services
        .assignments
        .advance_step(registration_id, payload.agent_id)?;
    Ok(Json(registration))
}

pub(crate) async fn ban_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
    Json(payload): Json<BanPayload>,
) -> Result<Json<Registration>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(services.bans.ban(registration_id, &payload.reason)?))
}

pub(crate) async fn unban_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(services.bans.unban(registration_id)?))
}

pub(crate) async fn unassigned_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(step): Path<WorkflowStep>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Registration>>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(
        services.assignments.list_unassigned_for_step(step, page)?,
    ))
}

pub(crate) async fn agent_queue_handler<R, D, N>(
    State(services): State<SharedServices<R, D, N>>,
    Path(agent_id): Path<AgentId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Registration>>, RegistrationError>
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    Ok(Json(
        services.assignments.list_assigned_to_agent(agent_id, page)?,
    ))
}
