//! HTTP surface over the reminder collections.
//!
//! Every handler is a plain store write or read. The reminder behaviour
//! itself (intake, cancellation cleanup, teardown) runs from the store
//! events those writes produce.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use remindly_notifications::{
    CancelOutcome, JobStore, NotificationError, NotificationRequest, RequestStatus, Schedule,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use time::{OffsetDateTime, UtcOffset};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::Storage(ref inner) if inner.is_not_found() => {
                Self::NotFound(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// An instant carried as an RFC 3339 string on the wire.
///
/// Incoming values are moved to UTC and cut to whole milliseconds, the
/// precision the store keeps, so a created record reads back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rfc3339(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

impl<'de> Deserialize<'de> for Rfc3339 {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let parsed = time::serde::rfc3339::deserialize(d)?.to_offset(UtcOffset::UTC);
        parsed
            .replace_millisecond(parsed.millisecond())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchedule {
    #[serde(default)]
    pub start_date: Option<Rfc3339>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Rfc3339>,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id,
            start_date: schedule.start_date.map(Rfc3339),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub schedule_id: String,
    #[serde(default, alias = "fcmToken")]
    pub push_token: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notification_times: Vec<Rfc3339>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub schedule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub notification_times: Vec<Rfc3339>,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<NotificationRequest> for RequestView {
    fn from(request: NotificationRequest) -> Self {
        Self {
            id: request.id,
            schedule_id: request.schedule_id,
            title: request.title,
            notification_times: request.notification_times.into_iter().map(Rfc3339).collect(),
            status: request.status,
            job_count: request.job_count,
            error: request.error,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/schedules", post(create_schedule))
        .route("/schedules/{id}", get(read_schedule).delete(delete_schedule))
        .route("/notification-requests", post(create_request))
        .route("/notification-requests/{id}", get(read_request))
        .route("/notification-requests/{id}/cancel", post(cancel_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(body): Json<CreateSchedule>,
) -> Result<impl IntoResponse, ApiError> {
    let schedule = Schedule {
        id: String::new(),
        start_date: body.start_date.map(|d| d.0),
    };
    let id = state.jobs.put_schedule(&schedule).await?;
    Ok((
        StatusCode::CREATED,
        Json(ScheduleView::from(Schedule { id, ..schedule })),
    ))
}

async fn read_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let schedule = state
        .jobs
        .get_schedule(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("schedule {id}")))?;
    Ok(Json(ScheduleView::from(schedule)))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.jobs.delete_schedule(&id).await? {
        return Err(ApiError::NotFound(format!("schedule {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.schedule_id.trim().is_empty() {
        return Err(ApiError::BadRequest("scheduleId must not be empty".into()));
    }

    let mut request = NotificationRequest {
        id: String::new(),
        schedule_id: body.schedule_id,
        push_token: body.push_token,
        title: body.title,
        notification_times: body.notification_times.into_iter().map(|t| t.0).collect(),
        status: RequestStatus::Pending,
        job_count: None,
        error: None,
    };
    request.id = state.jobs.create_request(&request).await?;
    tracing::debug!(request_id = %request.id, "Notification request stored");

    Ok((StatusCode::CREATED, Json(RequestView::from(request))))
}

async fn read_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .jobs
        .get_request(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("notification request {id}")))?;
    Ok(Json(RequestView::from(request)))
}

async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.jobs.cancel_request(&id).await? {
        CancelOutcome::Cancelled => Ok(Json(json!({"id": id, "status": RequestStatus::Cancelled}))),
        CancelOutcome::NotPending(status) => Err(ApiError::Conflict(format!(
            "notification request {id} is {status}, only pending requests can be cancelled"
        ))),
        CancelOutcome::NotFound => Err(ApiError::NotFound(format!("notification request {id}"))),
    }
}
