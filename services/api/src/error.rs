use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("webhook timed out after {0}s")]
    Timeout(u64),

    /// Webhook answered with a non-2xx status
    #[error("webhook returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("webhook unreachable: {0}")]
    Unreachable(String),

    #[error("invalid webhook response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream { .. }
            | GatewayError::Unreachable(_)
            | GatewayError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::Timeout(5).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            GatewayError::Upstream {
                status: 500,
                body: String::new()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::InvalidResponse("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = GatewayError::Unreachable("refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
