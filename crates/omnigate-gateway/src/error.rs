use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use omnigate_core::OmnigateError;
use tracing::error;

/// An [`OmnigateError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub OmnigateError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OmnigateError::NotFound(_) => StatusCode::NOT_FOUND,
            OmnigateError::Validation(_) => StatusCode::BAD_REQUEST,
            OmnigateError::Graph(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OmnigateError::Cancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OmnigateError> for ApiError {
    fn from(e: OmnigateError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}
