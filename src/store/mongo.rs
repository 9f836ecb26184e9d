//! MongoDB-backed pledge store
//!
//! The live public count is kept in a [`CountPublisher`]. It is recomputed
//! after every write made through this store and on a polling interval by
//! [`spawn_count_refresher`], so writes from other instances show up too.

use bson::{doc, oid::ObjectId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CountPublisher, CountSubscription, PledgeStore};
use crate::db::schemas::{
    PledgeDoc, PublicPledge, SubscriberDoc, PLEDGE_COLLECTION, SUBSCRIBER_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::pledge::now_iso;
use crate::types::{PledgeError, Result};

pub struct MongoPledgeStore {
    pledges: MongoCollection<PledgeDoc>,
    subscribers: MongoCollection<SubscriberDoc>,
    count: CountPublisher,
}

impl MongoPledgeStore {
    /// Open both collections and compute the initial public count
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let pledges = mongo.collection::<PledgeDoc>(PLEDGE_COLLECTION).await?;
        let subscribers = mongo.collection::<SubscriberDoc>(SUBSCRIBER_COLLECTION).await?;

        let store = Self {
            pledges,
            subscribers,
            count: CountPublisher::new(0),
        };
        store.refresh_count().await?;
        info!(
            "Pledge store ready on '{}' ({} public pledges)",
            mongo.db_name(),
            store.count.current()
        );

        Ok(store)
    }

    /// Recompute the public count and publish it if it changed
    pub async fn refresh_count(&self) -> Result<u64> {
        let count = self.pledges.count(doc! { "is_public": true }).await?;
        if self.count.publish(count) {
            debug!("Public pledge count is now {}", count);
        }
        Ok(count)
    }

    async fn refresh_after_write(&self) {
        if let Err(e) = self.refresh_count().await {
            warn!("Failed to refresh public count after write: {}", e);
        }
    }

    async fn set_fields(&self, pledge_id: &str, fields: bson::Document) -> Result<()> {
        let oid = parse_id(pledge_id)?;
        let result = self
            .pledges
            .update_one(doc! { "_id": oid }, doc! { "$set": fields })
            .await?;
        if result.matched_count == 0 {
            return Err(PledgeError::NotFound(format!("Pledge not found: {}", pledge_id)));
        }
        Ok(())
    }

    /// Set `fields` only while `field` is unset or already equals `value`.
    ///
    /// The guard sits in the update filter so a concurrent writer cannot slip
    /// in between the check and the write.
    async fn set_fields_unless_taken(
        &self,
        pledge_id: &str,
        field: &str,
        value: &str,
        fields: bson::Document,
        refusal: &str,
    ) -> Result<()> {
        let oid = parse_id(pledge_id)?;
        let result = self
            .pledges
            .update_one(
                doc! {
                    "_id": oid,
                    "$or": [
                        { field: { "$exists": false } },
                        { field: null },
                        { field: value },
                    ],
                },
                doc! { "$set": fields },
            )
            .await?;
        if result.matched_count > 0 {
            return Ok(());
        }

        match self.pledges.find_one(doc! { "_id": oid }).await? {
            Some(_) => Err(PledgeError::Unauthorized(format!("Pledge {} {}", pledge_id, refusal))),
            None => Err(PledgeError::NotFound(format!("Pledge not found: {}", pledge_id))),
        }
    }
}

/// An id that is not a valid ObjectId cannot name a stored pledge
fn parse_id(pledge_id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(pledge_id)
        .map_err(|_| PledgeError::NotFound(format!("Pledge not found: {}", pledge_id)))
}

#[async_trait::async_trait]
impl PledgeStore for MongoPledgeStore {
    async fn create(&self, mut pledge: PledgeDoc) -> Result<String> {
        pledge._id = None;
        pledge.created_at = now_iso();

        let id = self.pledges.insert_one(pledge).await?;
        info!("Pledge saved with ID: {}", id);
        self.refresh_after_write().await;

        Ok(id.to_hex())
    }

    async fn fetch_public_count(&self) -> Result<u64> {
        self.pledges.count(doc! { "is_public": true }).await
    }

    async fn fetch_public(&self, max: usize) -> Result<Vec<PublicPledge>> {
        let pledges = self
            .pledges
            .find_many(
                doc! { "is_public": true },
                Some(doc! { "created_at": -1 }),
                Some(max as i64),
            )
            .await?;
        Ok(pledges.iter().map(PledgeDoc::to_public).collect())
    }

    fn subscribe_public_count(&self) -> CountSubscription {
        self.count.subscribe()
    }

    async fn link_user(&self, pledge_id: &str, user_id: &str, user_email: &str) -> Result<()> {
        self.set_fields_unless_taken(
            pledge_id,
            "user_id",
            user_id,
            doc! {
                "user_id": user_id,
                "user_email": user_email,
                "linked_at": now_iso(),
            },
            "is linked to another user",
        )
        .await?;
        info!("Pledge linked to user: {} {}", pledge_id, user_id);
        Ok(())
    }

    async fn rescind(&self, pledge_id: &str, user_id: &str) -> Result<()> {
        let oid = parse_id(pledge_id)?;
        let pledge = self
            .pledges
            .find_one(doc! { "_id": oid })
            .await?
            .ok_or_else(|| PledgeError::NotFound(format!("Pledge not found: {}", pledge_id)))?;

        if pledge.user_id.as_deref() != Some(user_id) {
            return Err(PledgeError::Unauthorized(format!(
                "Pledge {} is not linked to this user",
                pledge_id
            )));
        }

        self.set_fields(
            pledge_id,
            doc! {
                "rescinded": true,
                "rescinded_at": now_iso(),
            },
        )
        .await?;
        info!("Pledge rescinded: {}", pledge_id);
        Ok(())
    }

    async fn add_email(&self, pledge_id: &str, email: &str) -> Result<()> {
        self.set_fields_unless_taken(
            pledge_id,
            "contact_email",
            email,
            doc! {
                "contact_email": email,
                "email_added_at": now_iso(),
            },
            "already has a contact email",
        )
        .await
    }

    async fn fetch_user_pledges(&self, user_id: &str) -> Result<Vec<PledgeDoc>> {
        self.pledges
            .find_many(
                doc! { "user_id": user_id },
                Some(doc! { "created_at": -1 }),
                None,
            )
            .await
    }

    async fn save_subscriber(&self, email: &str, pledge_id: Option<&str>) -> Result<String> {
        let subscriber =
            SubscriberDoc::new(email.to_string(), pledge_id.map(str::to_string), now_iso());
        let id = self.subscribers.insert_one(subscriber).await?;
        info!("Subscriber saved with ID: {}", id);
        Ok(id.to_hex())
    }
}

/// Periodically recompute the public count so changes made elsewhere reach
/// live subscribers.
pub fn spawn_count_refresher(store: Arc<MongoPledgeStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = store.refresh_count().await {
                warn!("Public count refresh failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Store round trips need a running MongoDB instance; the in-memory store
    // carries the behavioural tests.

    #[test]
    fn test_invalid_id_is_not_found() {
        let err = parse_id("not-an-object-id").unwrap_err();
        assert!(matches!(err, PledgeError::NotFound(_)));
        assert!(parse_id(&ObjectId::new().to_hex()).is_ok());
    }
}
