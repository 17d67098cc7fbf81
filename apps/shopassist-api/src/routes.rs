use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use shopassist_domain::model::{Product, Session};
use shopassist_service::{
	CatalogQuery, Error, HealthReport, TurnRequest, TurnResponse, VectorSearchRequest,
	VectorSearchResponse,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat", post(chat))
		.route("/v1/sessions", post(create_session))
		.route("/v1/sessions/{session_id}", get(get_session).delete(delete_session))
		.route("/v1/products", get(list_products))
		.route("/v1/products/{product_id}", get(get_product))
		.route("/v1/search/vector", post(vector_search))
		.with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
	#[serde(default)]
	pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductList {
	pub products: Vec<Product>,
	pub count: usize,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
	let report = state.service.health();
	let status = if report.ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

	(status, Json(report))
}

async fn chat(
	State(state): State<AppState>,
	Json(payload): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
	let response = state.service.handle_turn(payload).await?;

	Ok(Json(response))
}

async fn create_session(
	State(state): State<AppState>,
	Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
	let session = state.service.create_session(payload.user_id.as_deref()).await?;

	Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
	State(state): State<AppState>,
	Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
	let session = state.service.get_session(session_id).await?;

	Ok(Json(session))
}

async fn delete_session(
	State(state): State<AppState>,
	Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_session(session_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn list_products(
	State(state): State<AppState>,
	Query(query): Query<CatalogQuery>,
) -> Result<Json<ProductList>, ApiError> {
	let products = state.service.browse_products(&query).await?;

	Ok(Json(ProductList { count: products.len(), products }))
}

async fn get_product(
	State(state): State<AppState>,
	Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
	let product = state.service.get_product(&product_id).await?;

	Ok(Json(product))
}

async fn vector_search(
	State(state): State<AppState>,
	Json(payload): Json<VectorSearchRequest>,
) -> Result<Json<VectorSearchResponse>, ApiError> {
	let response = state.service.vector_search(payload).await?;

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
	error_code: &'static str,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
		Self { status, error_code, message: message.into() }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::Validation { message } =>
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			Error::NotFound { message } => Self::new(StatusCode::NOT_FOUND, "not_found", message),
			Error::Timeout { timeout_ms } => Self::new(
				StatusCode::GATEWAY_TIMEOUT,
				"timeout",
				format!("The request did not finish within {timeout_ms} ms."),
			),
			other => {
				tracing::error!(error = %other, "Request failed.");

				Self::new(
					StatusCode::SERVICE_UNAVAILABLE,
					"unavailable",
					"The assistant is temporarily unavailable. Please try again.",
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}
