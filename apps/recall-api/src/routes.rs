use axum::{
	Json, Router,
	extract::{FromRequestParts, Path, Query, State},
	http::{StatusCode, request::Parts},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use recall_service::{
	AskRequest, AskResponse, CreateNoteRequest, Error, ListNotesResponse, NoteResponse,
	OutboxReport, ReindexReport, RequeueReport, UpdateNoteRequest,
};

pub const OWNER_HEADER: &str = "x-owner-id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/notes", post(create_note).get(list_notes))
		.route("/v1/notes/{note_id}", get(get_note).put(update_note).delete(delete_note))
		.route("/v1/ask", post(ask))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/reindex", post(reindex))
		.route("/v1/admin/outbox", get(outbox_report))
		.route("/v1/admin/outbox/requeue", post(requeue_outbox))
		.with_state(state)
}

/// The caller's owner id, set by the authenticating proxy in front of this service.
#[derive(Debug)]
pub struct Owner(pub String);
impl<S> FromRequestParts<S> for Owner
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let owner = parts
			.headers
			.get(OWNER_HEADER)
			.and_then(|value| value.to_str().ok())
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.ok_or_else(|| {
				json_error(
					StatusCode::UNAUTHORIZED,
					"UNAUTHORIZED",
					format!("Missing {OWNER_HEADER} header."),
					Some(vec![OWNER_HEADER.to_string()]),
				)
			})?;

		Ok(Self(owner.to_string()))
	}
}

#[derive(Debug, Deserialize)]
struct ListQuery {
	limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReindexQuery {
	owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutboxQuery {
	dead_limit: Option<u32>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_note(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Json(payload): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteResponse>), ApiError> {
	let response = state.service.create_note(&owner, payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn list_notes(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Query(query): Query<ListQuery>,
) -> Result<Json<ListNotesResponse>, ApiError> {
	let response = state.service.list_notes(&owner, query.limit).await?;

	Ok(Json(response))
}

async fn get_note(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Path(note_id): Path<Uuid>,
) -> Result<Json<NoteResponse>, ApiError> {
	let response = state.service.get_note(&owner, note_id).await?;

	Ok(Json(response))
}

async fn update_note(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Path(note_id): Path<Uuid>,
	Json(payload): Json<UpdateNoteRequest>,
) -> Result<Json<NoteResponse>, ApiError> {
	let response = state.service.update_note(&owner, note_id, payload).await?;

	Ok(Json(response))
}

async fn delete_note(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Path(note_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_note(&owner, note_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn ask(
	State(state): State<AppState>,
	Owner(owner): Owner,
	Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
	let response = state.service.ask(&owner, payload).await?;

	Ok(Json(response))
}

async fn reindex(
	State(state): State<AppState>,
	Query(query): Query<ReindexQuery>,
) -> Result<Json<ReindexReport>, ApiError> {
	let response = state.service.reindex(query.owner_id.as_deref()).await?;

	Ok(Json(response))
}

async fn outbox_report(
	State(state): State<AppState>,
	Query(query): Query<OutboxQuery>,
) -> Result<Json<OutboxReport>, ApiError> {
	let response = state.service.outbox_report(query.dead_limit).await?;

	Ok(Json(response))
}

async fn requeue_outbox(State(state): State<AppState>) -> Result<Json<RequeueReport>, ApiError> {
	let response = state.service.requeue_dead_letters().await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let (status, code) = match &err {
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
			Error::EmbeddingUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_UNAVAILABLE"),
			Error::IndexUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "INDEX_UNAVAILABLE"),
			Error::DocumentStoreUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "DOCUMENT_STORE_UNAVAILABLE"),
			Error::CompletionUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "COMPLETION_UNAVAILABLE"),
			Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "STAGE_TIMEOUT"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, stage = ?err.stage(), "Request failed.");
		}

		json_error(status, code, err.to_string(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			fields: self.fields,
		};

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
