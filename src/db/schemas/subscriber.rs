//! Email subscriber schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for subscribers
pub const SUBSCRIBER_COLLECTION: &str = "subscribers";

/// Source tag written on every subscriber captured by the site
pub const SUBSCRIBER_SOURCE: &str = "website";

/// One email-capture event. Never deleted, only flagged unsubscribed.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SubscriberDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub email: String,

    /// Pledge signed in the same session, if any
    #[serde(default)]
    pub pledge_id: Option<String>,

    pub source: String,

    pub subscribed_at: String,

    #[serde(default)]
    pub unsubscribed: bool,
}

impl SubscriberDoc {
    pub fn new(email: String, pledge_id: Option<String>, subscribed_at: String) -> Self {
        Self {
            _id: None,
            email,
            pledge_id,
            source: SUBSCRIBER_SOURCE.to_string(),
            subscribed_at,
            unsubscribed: false,
        }
    }
}

impl IntoIndexes for SubscriberDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .name("email_index".to_string())
                    .build(),
            ),
        )]
    }
}
