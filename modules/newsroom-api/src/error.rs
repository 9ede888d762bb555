//! Maps the shared [`NewsroomError`] taxonomy onto the `{success, data|error}`
//! envelope (§6, §7).
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use newsroom_common::NewsroomError;
use serde::Serialize;

pub struct ApiError(pub NewsroomError);

impl From<NewsroomError> for ApiError {
    fn from(e: NewsroomError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    tag: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { success: false, error: ErrorPayload { tag: self.0.tag(), message: self.0.to_string() } };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct SuccessBody<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// `{success: true, data, warnings}` per §6 — `warnings` is how partial
/// successes surface degraded stages without failing the request (§7).
pub fn ok<T: Serialize>(data: T) -> Json<SuccessBody<T>> {
    Json(SuccessBody { success: true, data, warnings: Vec::new() })
}

pub fn ok_with_warnings<T: Serialize>(data: T, warnings: Vec<String>) -> Json<SuccessBody<T>> {
    Json(SuccessBody { success: true, data, warnings })
}

pub type ApiResult<T> = Result<T, ApiError>;
