//! HTTP server

pub mod http;

pub use http::{run, AppState};

#[cfg(test)]
pub(crate) mod tests {
    use clap::Parser;
    use hyper::header::{HeaderValue, AUTHORIZATION};
    use hyper::HeaderMap;
    use std::sync::Arc;

    use super::AppState;
    use crate::config::Args;
    use crate::fallback::LocalPledgeLog;
    use crate::identity::Identity;
    use crate::store::InMemoryPledgeStore;

    /// Dev-mode state over an in-memory store and a temporary fallback file
    pub(crate) async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::parse_from(["pledgewall", "--dev-mode"]);
        let fallback = Arc::new(LocalPledgeLog::new(dir.path().join("pledges.json")));
        let state = AppState::new(args, Arc::new(InMemoryPledgeStore::new()), "memory", fallback).unwrap();
        (state, dir)
    }

    /// Headers carrying a token the state's verifier accepts
    pub(crate) fn bearer(state: &AppState, identity: &Identity) -> HeaderMap {
        let token = state.verifier.as_ref().unwrap().issue(identity, 300).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }
}
