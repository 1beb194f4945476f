use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use crate::state::AppState;
use lexgraph_service::{
	AskRequest, AskResponse, Error, InternalSearchRequest, InternalSearchResponse,
	LegalSearchRequest, LegalSearchResponse,
};

const RETRY_HINT: &str = "Please try again shortly.";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/legal/search", post(legal_search))
		.route("/v1/internal/search", post(internal_search))
		.route("/v1/ask", post(ask))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn legal_search(
	State(state): State<AppState>,
	Json(payload): Json<LegalSearchRequest>,
) -> Result<Json<LegalSearchResponse>, ApiError> {
	let response = state.service.search_legal(payload).await?;

	Ok(Json(response))
}

async fn internal_search(
	State(state): State<AppState>,
	Json(payload): Json<InternalSearchRequest>,
) -> Result<Json<InternalSearchResponse>, ApiError> {
	let response = state.service.search_internal(payload).await?;

	Ok(Json(response))
}

async fn ask(
	State(state): State<AppState>,
	Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
	let response = state.service.ask(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	fn retryable(status: StatusCode, error_code: &str, err: &Error) -> Self {
		Self::new(status, error_code, format!("{err} {RETRY_HINT}"))
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let api_error = match &err {
			Error::InvalidRequest { message } =>
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message.clone()),
			Error::Encoding { .. } =>
				Self::retryable(StatusCode::BAD_GATEWAY, "encoding_failed", &err),
			Error::Provider { .. } =>
				Self::retryable(StatusCode::BAD_GATEWAY, "provider_unavailable", &err),
			Error::FilterParse { .. } =>
				Self::retryable(StatusCode::BAD_GATEWAY, "filter_reply_unparsable", &err),
			Error::CollectionUnavailable { .. } =>
				Self::retryable(StatusCode::SERVICE_UNAVAILABLE, "collection_unavailable", &err),
			Error::GraphLookup { .. } =>
				Self::retryable(StatusCode::SERVICE_UNAVAILABLE, "graph_unavailable", &err),
			Error::Storage { .. } | Error::Qdrant { .. } =>
				Self::retryable(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", &err),
			Error::Timeout { .. } =>
				Self::retryable(StatusCode::GATEWAY_TIMEOUT, "request_timeout", &err),
			Error::Merge { .. } =>
				Self::retryable(StatusCode::INTERNAL_SERVER_ERROR, "merge_failed", &err),
			Error::Notifier { .. } =>
				Self::retryable(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", &err),
		};

		if api_error.status.is_server_error() {
			tracing::error!(error = %err, error_code = %api_error.error_code, "Request failed.");
		}

		api_error
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
