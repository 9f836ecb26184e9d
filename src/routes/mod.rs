//! HTTP routes for pledgewall

pub mod health;
pub mod live;
pub mod pledges;
pub mod subscribers;

pub use health::{health_check, version_info};
pub use live::handle_live_count;
pub use pledges::{
    handle_add_email, handle_count, handle_link, handle_my_pledges, handle_public,
    handle_rescind, handle_submit,
};
pub use subscribers::handle_subscribe;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::identity::{bearer_token, BearerTokenProvider, Identity, IdentityClient};
use crate::server::AppState;
use crate::types::{PledgeError, Result};

/// Largest request body accepted (signature strokes included)
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// JSON response with CORS open to any origin
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            response
        }
        Err(e) => error_response(PledgeError::Internal(format!("Failed to encode response: {}", e))),
    }
}

/// `{"error": ..., "message": ...}` with the error's status code
pub fn error_response(err: PledgeError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let label = status.canonical_reason().unwrap_or("Error");
    let (status, message) = err.into_status_code_and_body();
    let body = serde_json::json!({
        "error": label,
        "message": message,
    });

    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Collect a request body and parse it as JSON
pub async fn read_json<T, B>(body: B) -> Result<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| PledgeError::BadRequest(format!("Failed to read body: {}", e)))?
        .to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

/// Resolve the caller's identity from an `Authorization: Bearer` header
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity> {
    let verifier = state
        .verifier
        .clone()
        .ok_or_else(|| PledgeError::Identity("Sign-in is not configured".into()))?;
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| PledgeError::Identity("Missing bearer token".into()))?;

    IdentityClient::new(BearerTokenProvider::new(verifier, token))
        .sign_in()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_json_rejects_garbage() {
        let parsed: Result<serde_json::Value> = read_json(Full::new(Bytes::from("{nope"))).await;
        assert!(matches!(parsed, Err(PledgeError::BadRequest(_))));

        let parsed: serde_json::Value = read_json(Full::new(Bytes::from(r#"{"a":1}"#))).await.unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[tokio::test]
    async fn test_read_json_enforces_size_limit() {
        let big = format!("\"{}\"", "x".repeat(MAX_BODY_BYTES + 1));
        let parsed: Result<String> = read_json(Full::new(Bytes::from(big))).await;
        assert!(matches!(parsed, Err(PledgeError::BadRequest(_))));
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(PledgeError::Validation("Please sign".into()));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
