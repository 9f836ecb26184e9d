//! Pledge document schema
//!
//! A pledge is written once. The only later updates are linking a user
//! identity, adding a contact email and marking it rescinded.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for pledges
pub const PLEDGE_COLLECTION: &str = "pledges";

/// Commitments made on the pledge form.
///
/// The first form variant has four checkboxes; the second carries one
/// fixed commitment label.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Commitments {
    Flags(CommitmentFlags),
    Single { label: String },
}

impl Default for Commitments {
    fn default() -> Self {
        Self::Flags(CommitmentFlags::default())
    }
}

/// The four checkbox commitments
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitmentFlags {
    #[serde(default)]
    pub no_smartphone: bool,
    #[serde(default)]
    pub no_social_media: bool,
    #[serde(default)]
    pub phone_free_school: bool,
    #[serde(default)]
    pub lead_by_example: bool,
}

impl CommitmentFlags {
    pub fn any(&self) -> bool {
        self.no_smartphone || self.no_social_media || self.phone_free_school || self.lead_by_example
    }
}

/// Pledge document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PledgeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Full name as typed on the form
    pub parent_name: String,

    /// Name shown publicly (full name, or "First L." when private)
    pub display_name: String,

    pub is_public: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_class: Option<String>,

    #[serde(default)]
    pub commitments: Commitments,

    /// Signature as an SVG document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_svg: Option<String>,

    /// Signature as a PNG data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_image: Option<String>,

    /// ISO-8601 creation time, stamped on create
    #[serde(default)]
    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_added_at: Option<String>,

    #[serde(default)]
    pub rescinded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescinded_at: Option<String>,
}

impl PledgeDoc {
    /// Hex form of the document id, if assigned
    pub fn id(&self) -> Option<String> {
        self._id.map(|id| id.to_hex())
    }

    /// Projection used by social proof listings
    pub fn to_public(&self) -> PublicPledge {
        PublicPledge {
            id: self.id().unwrap_or_default(),
            display_name: self.display_name.clone(),
            child_class: self.child_class.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Public slice of a pledge, safe to show to anonymous visitors
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicPledge {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_class: Option<String>,
    pub created_at: String,
}

impl IntoIndexes for PledgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Public listing and public count
            (
                doc! { "is_public": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("public_recent_index".to_string())
                        .build(),
                ),
            ),
            // Pledges owned by a signed-in user
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
        ]
    }
}
