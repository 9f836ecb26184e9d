//! Health and version endpoints
//!
//! `/health` reports 200 whenever the service is running. The `store`
//! field shows whether the remote store answered, `degraded` means pledges
//! are currently only reaching the local fallback.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::pledge::now_iso;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// "online" or "degraded"
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub store: &'static str,
    pub public_count: Option<u64>,
    pub local_fallback_records: Option<usize>,
    pub dev_mode: bool,
    pub timestamp: String,
}

pub async fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let remote = state.store.fetch_public_count().await;
    let local = state.fallback.count().await.ok();

    let response = HealthResponse {
        healthy: true,
        status: if remote.is_ok() { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        store: state.store_kind,
        public_count: remote.ok(),
        local_fallback_records: local,
        dev_mode: state.args.dev_mode,
        timestamp: now_iso(),
    };

    json_response(StatusCode::OK, &response)
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "pledgewall",
    };
    json_response(StatusCode::OK, &response)
}
