//! Pledge submission workflow
//!
//! ```text
//! Idle -> Validating -> Persisting -> Succeeded
//!                                  -> Succeeded (degraded, local only)
//! ```
//!
//! Validation failures return to `Idle` with nothing written. Once
//! validated, the pledge is written to the remote store first; if that
//! fails the local fallback takes it and the submission still succeeds.
//! Either way the local fallback gains exactly one copy of the record.
//! There are no retries.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::counter::{self, CounterCell};
use crate::db::schemas::{CommitmentFlags, Commitments, PledgeDoc};
use crate::fallback::LocalPledgeLog;
use crate::identity::Identity;
use crate::pledge::{display_name, now_iso, Privacy};
use crate::signature::SignaturePad;
use crate::social_proof::{FailurePolicy, SocialProofLoader, SocialProofView, SUCCESS_LIMIT};
use crate::store::PledgeStore;
use crate::types::{PledgeError, Result};

pub const MSG_SIGNATURE_REQUIRED: &str = "Please sign the commitment to proceed.";
pub const MSG_COMMITMENT_REQUIRED: &str = "Please select at least one commitment.";
pub const MSG_NAME_REQUIRED: &str = "Please enter your name.";
pub const MSG_EMAIL_INVALID: &str = "Please enter a valid email address.";

/// Commitment carried by the single-commitment form
pub const SINGLE_COMMITMENT_LABEL: &str =
    "I will delay my child's smartphone and social media use";

const SHARE_MESSAGE: &str =
    "I've signed the pledge to protect my child's healthy brain development. Join the other families: ";

/// Which commitment form the page shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormVariant {
    /// Four checkboxes, at least one required
    Flags,
    /// One fixed commitment, always made
    Single { label: String },
}

impl FormVariant {
    pub fn from_name(name: &str) -> Self {
        match name {
            "single" => FormVariant::Single {
                label: SINGLE_COMMITMENT_LABEL.to_string(),
            },
            _ => FormVariant::Flags,
        }
    }

    fn commitments(&self, flags: CommitmentFlags) -> Commitments {
        match self {
            FormVariant::Flags => Commitments::Flags(flags),
            FormVariant::Single { label } => Commitments::Single {
                label: label.clone(),
            },
        }
    }
}

/// What the visitor filled in
#[derive(Debug, Clone, Default)]
pub struct PledgeForm {
    pub parent_name: String,
    pub child_class: Option<String>,
    pub commitments: CommitmentFlags,
    pub privacy: Privacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Validating,
    Persisting,
    Succeeded { degraded: bool },
}

/// Where a successful submission ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Persisted {
    Remote { id: String },
    LocalFallback { reason: String },
}

impl Persisted {
    pub fn id(&self) -> Option<&str> {
        match self {
            Persisted::Remote { id } => Some(id),
            Persisted::LocalFallback { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Persisted::LocalFallback { .. })
    }
}

/// The success view
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub persisted: Persisted,
    pub record: PledgeDoc,
    pub count: u64,
    pub social_proof: SocialProofView,
    pub share_url: String,
}

/// One visitor's progress through the pledge page
#[derive(Debug, Clone)]
pub struct PledgeSession {
    pub state: SubmissionState,
    pub current_pledge_id: Option<String>,
}

impl Default for PledgeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PledgeSession {
    pub fn new() -> Self {
        Self {
            state: SubmissionState::Idle,
            current_pledge_id: None,
        }
    }

    /// Session for a pledge submitted earlier
    pub fn resume(pledge_id: impl Into<String>) -> Self {
        Self {
            state: SubmissionState::Succeeded { degraded: false },
            current_pledge_id: Some(pledge_id.into()),
        }
    }

    fn pledge_id(&self) -> Result<&str> {
        self.current_pledge_id
            .as_deref()
            .ok_or_else(|| PledgeError::BadRequest("No pledge submitted in this session".into()))
    }
}

pub struct SubmissionWorkflow {
    store: Arc<dyn PledgeStore>,
    fallback: Arc<LocalPledgeLog>,
    counter: Arc<CounterCell>,
    social: SocialProofLoader,
    variant: FormVariant,
    site_url: String,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<dyn PledgeStore>,
        fallback: Arc<LocalPledgeLog>,
        counter: Arc<CounterCell>,
        variant: FormVariant,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            social: SocialProofLoader::new(store.clone()),
            store,
            fallback,
            counter,
            variant,
            site_url: site_url.into(),
        }
    }

    pub fn variant(&self) -> &FormVariant {
        &self.variant
    }

    pub fn counter(&self) -> &CounterCell {
        &self.counter
    }

    /// Submit a pledge. `Err` means nothing was saved: either validation
    /// failed, or the remote store and the local fallback both failed.
    pub async fn submit(
        &self,
        session: &mut PledgeSession,
        form: PledgeForm,
        pad: &dyn SignaturePad,
    ) -> Result<SubmissionOutcome> {
        session.state = SubmissionState::Validating;
        if let Err(e) = self.validate(&form, pad) {
            session.state = SubmissionState::Idle;
            return Err(e);
        }

        session.state = SubmissionState::Persisting;
        let mut record = self.build_record(form, pad);

        let persisted = match self.store.create(record.clone()).await {
            Ok(id) => {
                record._id = bson::oid::ObjectId::parse_str(&id).ok();
                Persisted::Remote { id }
            }
            Err(e) => {
                warn!("Remote save failed, keeping pledge locally: {}", e);
                Persisted::LocalFallback {
                    reason: e.to_string(),
                }
            }
        };

        // Local copy of every successful submission
        if let Err(e) = self.fallback.append(&record).await {
            match persisted {
                Persisted::Remote { .. } => warn!("Local backup failed: {}", e),
                Persisted::LocalFallback { ref reason } => {
                    session.state = SubmissionState::Idle;
                    return Err(PledgeError::LocalStorage(format!(
                        "Pledge could not be saved (remote: {}; local: {})",
                        reason, e
                    )));
                }
            }
        }

        session.current_pledge_id = persisted.id().map(str::to_string);
        session.state = SubmissionState::Succeeded {
            degraded: persisted.is_degraded(),
        };
        info!(
            "Pledge submitted by {} ({})",
            record.display_name,
            if persisted.is_degraded() { "local only" } else { "remote" }
        );

        let count = counter::refresh(&self.counter, self.store.as_ref(), &self.fallback).await;
        let social_proof = self
            .social
            .load(SUCCESS_LIMIT, Some(&record.display_name), FailurePolicy::ShowSelfOnly)
            .await;

        Ok(SubmissionOutcome {
            persisted,
            record,
            count,
            social_proof,
            share_url: whatsapp_share_url(&self.site_url),
        })
    }

    fn validate(&self, form: &PledgeForm, pad: &dyn SignaturePad) -> Result<()> {
        if pad.is_empty() {
            return Err(PledgeError::Validation(MSG_SIGNATURE_REQUIRED.into()));
        }
        if self.variant == FormVariant::Flags && !form.commitments.any() {
            return Err(PledgeError::Validation(MSG_COMMITMENT_REQUIRED.into()));
        }
        if form.parent_name.trim().is_empty() {
            return Err(PledgeError::Validation(MSG_NAME_REQUIRED.into()));
        }
        Ok(())
    }

    fn build_record(&self, form: PledgeForm, pad: &dyn SignaturePad) -> PledgeDoc {
        let parent_name = form.parent_name.trim().to_string();
        PledgeDoc {
            display_name: display_name(&parent_name, form.privacy),
            parent_name,
            is_public: form.privacy.is_public(),
            child_class: form
                .child_class
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            commitments: self.variant.commitments(form.commitments),
            signature_svg: pad.to_vector(),
            signature_image: pad.to_raster(),
            created_at: now_iso(),
            ..Default::default()
        }
    }

    /// Attach the signed-in user to the session's pledge
    pub async fn link_identity(&self, session: &PledgeSession, identity: &Identity) -> Result<()> {
        let pledge_id = session.pledge_id()?;
        let email = identity.email.as_deref().unwrap_or_default();
        self.store.link_user(pledge_id, &identity.uid, email).await
    }

    /// Attach a contact email to the session's pledge
    pub async fn add_email(&self, session: &PledgeSession, email: &str) -> Result<()> {
        let email = check_email(email)?;
        let pledge_id = session.pledge_id()?;
        self.store.add_email(pledge_id, email).await
    }

    /// Record an email sign-up, linked to the session's pledge if there is one
    pub async fn subscribe_email(&self, session: &PledgeSession, email: &str) -> Result<String> {
        let email = check_email(email)?;
        self.store
            .save_subscriber(email, session.current_pledge_id.as_deref())
            .await
    }

    pub async fn rescind(&self, pledge_id: &str, identity: &Identity) -> Result<()> {
        self.store.rescind(pledge_id, &identity.uid).await?;
        info!("Pledge {} rescinded by {}", pledge_id, identity.uid);
        Ok(())
    }

    pub async fn my_pledges(&self, identity: &Identity) -> Vec<PledgeDoc> {
        self.store.user_pledges(&identity.uid).await
    }
}

fn check_email(email: &str) -> Result<&str> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(PledgeError::Validation(MSG_EMAIL_INVALID.into())),
    }
}

/// Pre-filled WhatsApp share link pointing at the pledge page
pub fn whatsapp_share_url(site_url: &str) -> String {
    let text = format!("{}{}", SHARE_MESSAGE, site_url);
    let query = serde_urlencoded::to_string([("text", text.as_str())]).unwrap_or_default();
    format!("https://wa.me/?{}", query)
}
