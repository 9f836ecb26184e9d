//! Email sign-up endpoint (`POST /api/subscribers`)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;

use super::{error_response, json_response};
use crate::server::AppState;
use crate::workflow::PledgeSession;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub email: String,
    /// Pledge submitted just before signing up, if any
    #[serde(default)]
    pub pledge_id: Option<String>,
}

pub async fn handle_subscribe(state: &AppState, request: SubscribeRequest) -> Response<Full<Bytes>> {
    let session = match request.pledge_id {
        Some(id) => PledgeSession::resume(id),
        None => PledgeSession::new(),
    };

    match state.workflow.subscribe_email(&session, &request.email).await {
        Ok(id) => json_response(
            StatusCode::CREATED,
            &serde_json::json!({ "success": true, "id": id }),
        ),
        Err(e) => error_response(e),
    }
}
