use crate::error::ExtractError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.is_client_error() {
            tracing::info!(status = status.as_u16(), error = %self, "Request rejected");
        } else {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(self.envelope())).into_response()
    }
}
