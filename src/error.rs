use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("malformed webhook payload: {0}")]
    BadPayload(#[from] serde_urlencoded::de::Error),
    #[error("failed to read request body")]
    BadBody,
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("missing or invalid Twilio signature")]
    BadSignature,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadPayload(_) | AppError::BadBody | AppError::UnknownStep(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::BadSignature => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Log an error that should not change what the caller hears.
pub fn handle_error(e: impl std::error::Error) {
    error!("ERROR: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_json_error_body() {
        let response = AppError::BadSignature.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "missing or invalid Twilio signature");
    }

    #[test]
    fn malformed_payload_is_a_client_error() {
        let err = serde_urlencoded::from_str::<crate::twilio_types::StatusCallbackPayload>("x=1")
            .map_err(AppError::from)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
