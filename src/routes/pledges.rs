//! Pledge endpoints
//!
//! - `POST /api/pledges` - submit a signed pledge
//! - `GET  /api/pledges/count` - public pledge count
//! - `GET  /api/pledges/public?limit=&view=&self=` - social proof tags
//! - `POST /api/pledges/{id}/link` - attach the signed-in user (bearer)
//! - `POST /api/pledges/{id}/rescind` - rescind an owned pledge (bearer)
//! - `POST /api/pledges/{id}/email` - attach a contact email
//! - `GET  /api/me/pledges` - the signed-in user's pledges (bearer)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{authenticate, error_response, json_response};
use crate::counter;
use crate::db::schemas::{CommitmentFlags, Commitments, PledgeDoc};
use crate::pledge::Privacy;
use crate::server::AppState;
use crate::signature::{Point, StrokePad};
use crate::social_proof::{
    FailurePolicy, SocialProofView, COMPACT_LIMIT, LANDING_LIMIT, SUCCESS_LIMIT,
};
use crate::types::PledgeError;
use crate::workflow::{Persisted, PledgeForm, PledgeSession};

/// Upper bound on `limit` for public listings
pub const MAX_PUBLIC_LIMIT: usize = 50;

/// Checkbox state as posted by the pledge form
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentsInput {
    #[serde(default)]
    pub no_smartphone: bool,
    #[serde(default)]
    pub no_social_media: bool,
    #[serde(default)]
    pub phone_free_school: bool,
    #[serde(default)]
    pub lead_by_example: bool,
}

impl From<CommitmentsInput> for CommitmentFlags {
    fn from(input: CommitmentsInput) -> Self {
        Self {
            no_smartphone: input.no_smartphone,
            no_social_media: input.no_social_media,
            phone_free_school: input.phone_free_school,
            lead_by_example: input.lead_by_example,
        }
    }
}

/// Signature strokes in CSS pixels, with the canvas they were drawn on
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInput {
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_pixel_ratio")]
    pub device_pixel_ratio: f32,
    #[serde(default)]
    pub strokes: Vec<Vec<Point>>,
}

fn default_pixel_ratio() -> f32 {
    1.0
}

/// Largest canvas side accepted, in CSS pixels
pub const MAX_CANVAS_SIDE: f32 = 2048.0;

/// Largest device pixel ratio accepted
pub const MAX_PIXEL_RATIO: f32 = 4.0;

/// Most stroke points accepted in one signature
pub const MAX_SIGNATURE_POINTS: usize = 20_000;

impl SignatureInput {
    /// Rebuild the pad, clamping the canvas so the raster export stays bounded
    pub fn into_pad(self) -> Result<StrokePad, PledgeError> {
        let points: usize = self.strokes.iter().map(Vec::len).sum();
        if points > MAX_SIGNATURE_POINTS {
            return Err(PledgeError::BadRequest(format!(
                "Signature has {} points; at most {} are accepted",
                points, MAX_SIGNATURE_POINTS
            )));
        }

        let clamp = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
        Ok(StrokePad::with_strokes(
            clamp(self.width, MAX_CANVAS_SIDE),
            clamp(self.height, MAX_CANVAS_SIDE),
            clamp(self.device_pixel_ratio, MAX_PIXEL_RATIO),
            self.strokes,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPledgeRequest {
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub child_class: Option<String>,
    #[serde(default)]
    pub commitments: CommitmentsInput,
    #[serde(default)]
    pub privacy: Privacy,
    pub signature: SignatureInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPledgeResponse {
    pub success: bool,
    /// Set when the pledge reached the remote store
    pub pledge_id: Option<String>,
    pub persisted: Persisted,
    pub display_name: String,
    pub count: u64,
    pub signature_svg: Option<String>,
    pub social_proof: SocialProofView,
    pub share_url: String,
}

pub async fn handle_submit(state: &AppState, request: SubmitPledgeRequest) -> Response<Full<Bytes>> {
    let form = PledgeForm {
        parent_name: request.parent_name,
        child_class: request.child_class,
        commitments: request.commitments.into(),
        privacy: request.privacy,
    };
    let pad = match request.signature.into_pad() {
        Ok(pad) => pad,
        Err(e) => return error_response(e),
    };
    let signature = match tokio::task::spawn_blocking(move || pad.render()).await {
        Ok(signature) => signature,
        Err(e) => {
            return error_response(PledgeError::Internal(format!(
                "Signature rendering failed: {}",
                e
            )))
        }
    };

    let mut session = PledgeSession::new();
    match state.workflow.submit(&mut session, form, &signature).await {
        Ok(outcome) => json_response(
            StatusCode::CREATED,
            &SubmitPledgeResponse {
                success: true,
                pledge_id: outcome.persisted.id().map(str::to_string),
                display_name: outcome.record.display_name.clone(),
                signature_svg: outcome.record.signature_svg.clone(),
                persisted: outcome.persisted,
                count: outcome.count,
                social_proof: outcome.social_proof,
                share_url: outcome.share_url,
            },
        ),
        Err(e) => error_response(e),
    }
}

pub async fn handle_count(state: &AppState) -> Response<Full<Bytes>> {
    let count = counter::refresh(&state.counter, state.store.as_ref(), &state.fallback).await;
    json_response(StatusCode::OK, &serde_json::json!({ "count": count }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PublicQuery {
    pub limit: Option<usize>,
    pub view: Option<String>,
    #[serde(rename = "self")]
    pub self_name: Option<String>,
}

pub async fn handle_public(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let query: PublicQuery = match query.map(serde_urlencoded::from_str).transpose() {
        Ok(q) => q.unwrap_or_default(),
        Err(e) => {
            return error_response(PledgeError::BadRequest(format!("Invalid query: {}", e)))
        }
    };

    let (default_limit, policy) = match query.view.as_deref() {
        Some("success") => (SUCCESS_LIMIT, FailurePolicy::ShowSelfOnly),
        Some("landing") => (LANDING_LIMIT, FailurePolicy::HideSection),
        _ => (COMPACT_LIMIT, FailurePolicy::HideSection),
    };
    let limit = query.limit.unwrap_or(default_limit).min(MAX_PUBLIC_LIMIT);
    debug!("Public listing: limit={} policy={:?}", limit, policy);

    let view = state
        .social
        .load(limit, query.self_name.as_deref(), policy)
        .await;
    json_response(StatusCode::OK, &view)
}

pub async fn handle_link(state: &AppState, pledge_id: &str, headers: &HeaderMap) -> Response<Full<Bytes>> {
    let identity = match authenticate(state, headers).await {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    let session = PledgeSession::resume(pledge_id);
    match state.workflow.link_identity(&session, &identity).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "success": true })),
        Err(e) => error_response(e),
    }
}

pub async fn handle_rescind(
    state: &AppState,
    pledge_id: &str,
    headers: &HeaderMap,
) -> Response<Full<Bytes>> {
    let identity = match authenticate(state, headers).await {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    match state.workflow.rescind(pledge_id, &identity).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "success": true })),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

pub async fn handle_add_email(
    state: &AppState,
    pledge_id: &str,
    request: EmailRequest,
) -> Response<Full<Bytes>> {
    let session = PledgeSession::resume(pledge_id);
    match state.workflow.add_email(&session, &request.email).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "success": true })),
        Err(e) => error_response(e),
    }
}

/// A pledge as its owner sees it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedPledge {
    pub id: String,
    pub display_name: String,
    pub is_public: bool,
    pub child_class: Option<String>,
    pub commitments: Commitments,
    pub created_at: String,
    pub rescinded: bool,
    pub rescinded_at: Option<String>,
}

impl From<PledgeDoc> for OwnedPledge {
    fn from(doc: PledgeDoc) -> Self {
        Self {
            id: doc.id().unwrap_or_default(),
            display_name: doc.display_name,
            is_public: doc.is_public,
            child_class: doc.child_class,
            commitments: doc.commitments,
            created_at: doc.created_at,
            rescinded: doc.rescinded,
            rescinded_at: doc.rescinded_at,
        }
    }
}

pub async fn handle_my_pledges(state: &AppState, headers: &HeaderMap) -> Response<Full<Bytes>> {
    let identity = match authenticate(state, headers).await {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    let pledges: Vec<OwnedPledge> = state
        .workflow
        .my_pledges(&identity)
        .await
        .into_iter()
        .map(OwnedPledge::from)
        .collect();
    json_response(StatusCode::OK, &pledges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::server::tests::{bearer, test_state};
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn submit_request(name: &str, strokes: Vec<Vec<Point>>) -> SubmitPledgeRequest {
        serde_json::from_value(serde_json::json!({
            "parentName": name,
            "childClass": "3rd Class",
            "commitments": { "noSocialMedia": true },
            "privacy": "public",
            "signature": {
                "width": 300.0,
                "height": 150.0,
                "devicePixelRatio": 2.0,
                "strokes": strokes,
            }
        }))
        .unwrap()
    }

    fn scribble() -> Vec<Vec<Point>> {
        vec![vec![Point { x: 5.0, y: 5.0 }, Point { x: 60.0, y: 30.0 }]]
    }

    #[tokio::test]
    async fn test_submit_then_count_and_list() {
        let (state, _dir) = test_state().await;

        let response = handle_submit(&state, submit_request("Niamh Walsh", scribble())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["persisted"]["kind"], "remote");
        assert_eq!(body["count"], 1);
        assert_eq!(body["socialProof"]["tags"][0]["isSelf"], true);
        assert!(body["shareUrl"].as_str().unwrap().starts_with("https://wa.me/"));

        let body = body_json(handle_count(&state).await).await;
        assert_eq!(body["count"], 1);

        let body = body_json(handle_public(&state, Some("view=landing")).await).await;
        assert_eq!(body["state"], "tags");
        assert_eq!(body["tags"][0]["name"], "Niamh Walsh");
        assert_eq!(body["tags"][0]["classLabel"], "3rd Class");
    }

    #[tokio::test]
    async fn test_unsigned_submit_is_unprocessable() {
        let (state, _dir) = test_state().await;
        let response = handle_submit(&state, submit_request("Niamh Walsh", Vec::new())).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Please sign the commitment to proceed.");
        assert_eq!(state.fallback.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_far_off_stroke_submits_promptly() {
        let (state, _dir) = test_state().await;
        let strokes = vec![vec![Point { x: 0.0, y: 0.0 }, Point { x: 1e8, y: 0.0 }]];

        let response = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            handle_submit(&state, submit_request("Niamh Walsh", strokes)),
        )
        .await
        .expect("submission should not stall on off-canvas points");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_oversized_signature_is_rejected() {
        let (state, _dir) = test_state().await;
        let stroke: Vec<Point> = (0..=MAX_SIGNATURE_POINTS)
            .map(|i| Point { x: (i % 300) as f32, y: 10.0 })
            .collect();

        let response = handle_submit(&state, submit_request("Niamh Walsh", vec![stroke])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.fallback.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_landing_is_hidden() {
        let (state, _dir) = test_state().await;
        let body = body_json(handle_public(&state, Some("view=landing&limit=5")).await).await;
        assert_eq!(body["state"], "hidden");
    }

    #[tokio::test]
    async fn test_link_rescind_and_list_own() {
        let (state, _dir) = test_state().await;
        let body = body_json(handle_submit(&state, submit_request("Niamh Walsh", scribble())).await).await;
        let id = body["pledgeId"].as_str().unwrap().to_string();

        let owner = Identity {
            uid: "uid-niamh".into(),
            email: Some("niamh@example.com".into()),
            display_name: None,
            photo_url: None,
        };
        let stranger = Identity {
            uid: "uid-other".into(),
            ..owner.clone()
        };

        let response = handle_link(&state, &id, &HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = handle_link(&state, &id, &bearer(&state, &owner)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_link(&state, &id, &bearer(&state, &stranger)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = handle_rescind(&state, &id, &bearer(&state, &stranger)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = handle_rescind(&state, &id, &bearer(&state, &owner)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(handle_my_pledges(&state, &bearer(&state, &owner)).await).await;
        assert_eq!(body[0]["id"], id.as_str());
        assert_eq!(body[0]["rescinded"], true);

        // Rescinding does not lower the public count
        let body = body_json(handle_count(&state).await).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_add_email_validates() {
        let (state, _dir) = test_state().await;
        let body = body_json(handle_submit(&state, submit_request("Niamh Walsh", scribble())).await).await;
        let id = body["pledgeId"].as_str().unwrap();

        let bad = handle_add_email(&state, id, EmailRequest { email: "nope".into() }).await;
        assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let ok = handle_add_email(&state, id, EmailRequest { email: "n@example.com".into() }).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let replaced =
            handle_add_email(&state, id, EmailRequest { email: "other@example.com".into() }).await;
        assert_eq!(replaced.status(), StatusCode::FORBIDDEN);

        let missing = handle_add_email(
            &state,
            &bson::oid::ObjectId::new().to_hex(),
            EmailRequest { email: "n@example.com".into() },
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
