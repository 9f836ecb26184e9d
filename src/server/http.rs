//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. WebSocket upgrades
//! are enabled for the live count feed.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::counter::CounterCell;
use crate::fallback::LocalPledgeLog;
use crate::identity::TokenVerifier;
use crate::routes::{self, error_response, json_response, read_json};
use crate::social_proof::SocialProofLoader;
use crate::store::PledgeStore;
use crate::types::Result;
use crate::workflow::{FormVariant, SubmissionWorkflow};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Remote pledge store (MongoDB, or in-memory in dev mode)
    pub store: Arc<dyn PledgeStore>,
    /// "mongodb" or "memory"
    pub store_kind: &'static str,
    pub fallback: Arc<LocalPledgeLog>,
    /// Authoritative public count, mirrored into every display
    pub counter: Arc<CounterCell>,
    pub workflow: SubmissionWorkflow,
    pub social: SocialProofLoader,
    /// None when sign-in is not configured
    pub verifier: Option<TokenVerifier>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn PledgeStore>,
        store_kind: &'static str,
        fallback: Arc<LocalPledgeLog>,
    ) -> Result<Self> {
        let verifier = args
            .identity_secret()
            .map(|secret| TokenVerifier::new(secret, args.identity_issuer.clone()))
            .transpose()?;

        let counter = Arc::new(CounterCell::new());
        let workflow = SubmissionWorkflow::new(
            Arc::clone(&store),
            Arc::clone(&fallback),
            Arc::clone(&counter),
            FormVariant::from_name(&args.form_variant),
            args.site_url.clone(),
        );

        Ok(Self {
            social: SocialProofLoader::new(Arc::clone(&store)),
            args,
            store,
            store_kind,
            fallback,
            counter,
            workflow,
            verifier,
            started_at: Instant::now(),
        })
    }
}

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Pledgewall listening on {} ({} store)",
        state.args.listen, state.store_kind
    );
    if state.args.dev_mode {
        warn!("Development mode enabled - dev identity secret and in-memory fallback store allowed");
    }
    if state.verifier.is_none() {
        warn!("No identity secret configured - link, rescind and my-pledges are disabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(to_boxed(preflight_response()));
    }

    if method == Method::POST {
        if let Some((pledge_id, action)) = pledge_action(&path) {
            let response = match action {
                PledgeAction::Link => routes::handle_link(&state, pledge_id, req.headers()).await,
                PledgeAction::Rescind => {
                    routes::handle_rescind(&state, pledge_id, req.headers()).await
                }
                PledgeAction::Email => match read_json(req.into_body()).await {
                    Ok(request) => routes::handle_add_email(&state, pledge_id, request).await,
                    Err(e) => error_response(e),
                },
            };
            return Ok(to_boxed(response));
        }
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") => routes::health_check(&state).await,
        (Method::GET, "/version") => routes::version_info(),

        (Method::GET, "/api/pledges/live") => {
            routes::handle_live_count(Arc::clone(&state.counter), req).await
        }

        (Method::POST, "/api/pledges") => match read_json(req.into_body()).await {
            Ok(request) => routes::handle_submit(&state, request).await,
            Err(e) => error_response(e),
        },
        (Method::GET, "/api/pledges/count") => routes::handle_count(&state).await,
        (Method::GET, "/api/pledges/public") => {
            routes::handle_public(&state, query.as_deref()).await
        }

        (Method::GET, "/api/me/pledges") => routes::handle_my_pledges(&state, req.headers()).await,

        (Method::POST, "/api/subscribers") => match read_json(req.into_body()).await {
            Ok(request) => routes::handle_subscribe(&state, request).await,
            Err(e) => error_response(e),
        },

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PledgeAction {
    Link,
    Rescind,
    Email,
}

/// Match `/api/pledges/{id}/{action}`
fn pledge_action(path: &str) -> Option<(&str, PledgeAction)> {
    let rest = path.strip_prefix("/api/pledges/")?;
    let (id, action) = rest.split_once('/')?;
    if id.is_empty() {
        return None;
    }
    let action = match action {
        "link" => PledgeAction::Link,
        "rescind" => PledgeAction::Rescind,
        "email" => PledgeAction::Email,
        _ => return None,
    };
    Some((id, action))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pledge_action_paths() {
        assert_eq!(
            pledge_action("/api/pledges/abc123/link"),
            Some(("abc123", PledgeAction::Link))
        );
        assert_eq!(
            pledge_action("/api/pledges/abc123/rescind"),
            Some(("abc123", PledgeAction::Rescind))
        );
        assert_eq!(
            pledge_action("/api/pledges/abc123/email"),
            Some(("abc123", PledgeAction::Email))
        );
        assert_eq!(pledge_action("/api/pledges/count"), None);
        assert_eq!(pledge_action("/api/pledges//link"), None);
        assert_eq!(pledge_action("/api/pledges/abc/delete"), None);
    }

    #[test]
    fn test_preflight_allows_any_origin() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
