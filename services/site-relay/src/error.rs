//! Relay errors and their JSON rendering
//!
//! Every failure reaching a route handler becomes
//! `{"error":{"type":..,"message":..,"request_id":"req_.."}}`. Upstream
//! rejections keep the upstream status code and add `upstream_status`;
//! token flow failures add `auth_kind`.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Longest upstream body echoed back in an error message
const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("token acquisition failed: {0}")]
    Auth(#[from] instant_on_auth::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("upstream timeout after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("invalid site id: {0:?}")]
    InvalidSiteId(String),
}

impl RelayError {
    /// Status code returned to the API client.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Auth(_) => StatusCode::BAD_GATEWAY,
            RelayError::Upstream { status, .. } => *status,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Transport(_) | RelayError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            RelayError::InvalidSiteId(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            RelayError::Auth(_) => "auth_error",
            RelayError::InvalidSiteId(_) => "invalid_request",
            _ => "upstream_error",
        }
    }

    /// Render as a JSON error response tagged with `request_id`.
    pub fn into_response_with(self, request_id: &str) -> Response {
        let mut error = serde_json::json!({
            "type": self.error_type(),
            "message": self.to_string(),
            "request_id": request_id,
        });
        match &self {
            RelayError::Upstream { status, .. } => {
                error["upstream_status"] = status.as_u16().into();
            }
            RelayError::Auth(e) => {
                error["auth_kind"] = e.kind().into();
            }
            _ => {}
        }

        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}

/// Cut an upstream body down to `MAX_ERROR_BODY` bytes on a char boundary.
pub fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn upstream_error_keeps_status_and_reports_it() {
        let err = RelayError::Upstream {
            status: StatusCode::NOT_FOUND,
            body: "site not found".into(),
        };
        let response = err.into_response_with("req_abc");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "upstream_error");
        assert_eq!(json["error"]["upstream_status"], 404);
        assert_eq!(json["error"]["request_id"], "req_abc");
        assert!(
            json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("site not found")
        );
    }

    #[tokio::test]
    async fn auth_error_is_bad_gateway_with_kind() {
        let err = RelayError::from(instant_on_auth::Error::Credential("401".into()));
        let response = err.into_response_with("req_1");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "auth_error");
        assert_eq!(json["error"]["auth_kind"], "credential");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            RelayError::Timeout(Duration::from_secs(30)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RelayError::Transport("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RelayError::InvalidSiteId("../x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        let err = RelayError::Timeout(Duration::from_millis(300));
        assert_eq!(err.to_string(), "upstream timeout after 300ms");
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let truncated = truncate_body(body);
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_body("short".into()), "short");
    }
}
