//! In-memory pledge store
//!
//! Used in dev mode when MongoDB is unreachable, and in tests. Can be put
//! offline to simulate a failing remote.

use bson::oid::ObjectId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{CountPublisher, CountSubscription, PledgeStore};
use crate::db::schemas::{PledgeDoc, PublicPledge, SubscriberDoc};
use crate::pledge::now_iso;
use crate::types::{PledgeError, Result};

struct Entry {
    /// Insertion order, breaks ties between equal timestamps
    seq: u64,
    pledge: PledgeDoc,
}

pub struct InMemoryPledgeStore {
    pledges: DashMap<String, Entry>,
    subscribers: DashMap<String, SubscriberDoc>,
    next_seq: AtomicU64,
    offline: AtomicBool,
    count: CountPublisher,
}

impl InMemoryPledgeStore {
    pub fn new() -> Self {
        Self {
            pledges: DashMap::new(),
            subscribers: DashMap::new(),
            next_seq: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            count: CountPublisher::new(0),
        }
    }

    /// While offline every operation fails with a database error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Stored pledge by id, bypassing the offline switch
    pub fn get(&self, pledge_id: &str) -> Option<PledgeDoc> {
        self.pledges.get(pledge_id).map(|e| e.pledge.clone())
    }

    pub fn len(&self) -> usize {
        self.pledges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pledges.is_empty()
    }

    pub fn subscribers(&self) -> Vec<SubscriberDoc> {
        self.subscribers.iter().map(|s| s.value().clone()).collect()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(PledgeError::Database("store unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn public_count(&self) -> u64 {
        self.pledges.iter().filter(|e| e.pledge.is_public).count() as u64
    }

    fn update<F>(&self, pledge_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut PledgeDoc) -> Result<()>,
    {
        let mut entry = self
            .pledges
            .get_mut(pledge_id)
            .ok_or_else(|| PledgeError::NotFound(format!("Pledge not found: {}", pledge_id)))?;
        apply(&mut entry.pledge)
    }
}

impl Default for InMemoryPledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PledgeStore for InMemoryPledgeStore {
    async fn create(&self, mut pledge: PledgeDoc) -> Result<String> {
        self.ensure_online()?;

        let id = ObjectId::new();
        pledge._id = Some(id);
        pledge.created_at = now_iso();

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.pledges.insert(id.to_hex(), Entry { seq, pledge });
        self.count.publish(self.public_count());

        Ok(id.to_hex())
    }

    async fn fetch_public_count(&self) -> Result<u64> {
        self.ensure_online()?;
        Ok(self.public_count())
    }

    async fn fetch_public(&self, max: usize) -> Result<Vec<PublicPledge>> {
        self.ensure_online()?;

        let mut public: Vec<(String, u64, PublicPledge)> = self
            .pledges
            .iter()
            .filter(|e| e.pledge.is_public)
            .map(|e| (e.pledge.created_at.clone(), e.seq, e.pledge.to_public()))
            .collect();
        public.sort_by(|a, b| (&b.0, b.1).cmp(&(&a.0, a.1)));

        Ok(public.into_iter().take(max).map(|(_, _, p)| p).collect())
    }

    fn subscribe_public_count(&self) -> CountSubscription {
        self.count.subscribe()
    }

    async fn link_user(&self, pledge_id: &str, user_id: &str, user_email: &str) -> Result<()> {
        self.ensure_online()?;
        self.update(pledge_id, |pledge| {
            if pledge.user_id.as_deref().is_some_and(|owner| owner != user_id) {
                return Err(PledgeError::Unauthorized(format!(
                    "Pledge {} is linked to another user",
                    pledge_id
                )));
            }
            pledge.user_id = Some(user_id.to_string());
            pledge.user_email = Some(user_email.to_string());
            pledge.linked_at = Some(now_iso());
            Ok(())
        })
    }

    async fn rescind(&self, pledge_id: &str, user_id: &str) -> Result<()> {
        self.ensure_online()?;
        self.update(pledge_id, |pledge| {
            if pledge.user_id.as_deref() != Some(user_id) {
                return Err(PledgeError::Unauthorized(format!(
                    "Pledge {} is not linked to this user",
                    pledge_id
                )));
            }
            pledge.rescinded = true;
            pledge.rescinded_at = Some(now_iso());
            Ok(())
        })
    }

    async fn add_email(&self, pledge_id: &str, email: &str) -> Result<()> {
        self.ensure_online()?;
        self.update(pledge_id, |pledge| {
            if pledge.contact_email.as_deref().is_some_and(|existing| existing != email) {
                return Err(PledgeError::Unauthorized(format!(
                    "Pledge {} already has a contact email",
                    pledge_id
                )));
            }
            pledge.contact_email = Some(email.to_string());
            pledge.email_added_at = Some(now_iso());
            Ok(())
        })
    }

    async fn fetch_user_pledges(&self, user_id: &str) -> Result<Vec<PledgeDoc>> {
        self.ensure_online()?;

        let mut owned: Vec<(u64, PledgeDoc)> = self
            .pledges
            .iter()
            .filter(|e| e.pledge.user_id.as_deref() == Some(user_id))
            .map(|e| (e.seq, e.pledge.clone()))
            .collect();
        owned.sort_by(|a, b| (&b.1.created_at, b.0).cmp(&(&a.1.created_at, a.0)));

        Ok(owned.into_iter().map(|(_, p)| p).collect())
    }

    async fn save_subscriber(&self, email: &str, pledge_id: Option<&str>) -> Result<String> {
        self.ensure_online()?;

        let id = ObjectId::new();
        let mut subscriber =
            SubscriberDoc::new(email.to_string(), pledge_id.map(str::to_string), now_iso());
        subscriber._id = Some(id);
        self.subscribers.insert(id.to_hex(), subscriber);

        Ok(id.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pledge(name: &str, is_public: bool) -> PledgeDoc {
        PledgeDoc {
            parent_name: name.to_string(),
            display_name: name.to_string(),
            is_public,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_public_listing_is_bounded_and_newest_first() {
        let store = InMemoryPledgeStore::new();
        for i in 0..5 {
            store.create(pledge(&format!("family {}", i), true)).await.unwrap();
        }
        store.create(pledge("hidden", false)).await.unwrap();

        let listed = store.list_public(3).await;
        assert_eq!(listed.len(), 3);
        let names: Vec<&str> = listed.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["family 4", "family 3", "family 2"]);
        for pair in listed.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_count_ignores_private_pledges() {
        let store = InMemoryPledgeStore::new();
        store.create(pledge("a", true)).await.unwrap();
        store.create(pledge("b", false)).await.unwrap();
        assert_eq!(store.count_public().await, 1);
    }

    #[tokio::test]
    async fn test_rescind_requires_linked_user() {
        let store = InMemoryPledgeStore::new();
        let id = store.create(pledge("a", true)).await.unwrap();
        store.link_user(&id, "user-1", "a@example.com").await.unwrap();

        let err = store.rescind(&id, "user-2").await.unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized(_)));
        assert!(!store.get(&id).unwrap().rescinded);

        store.rescind(&id, "user-1").await.unwrap();
        let stored = store.get(&id).unwrap();
        assert!(stored.rescinded);
        assert!(stored.rescinded_at.is_some());
    }

    #[tokio::test]
    async fn test_rescind_unlinked_or_missing() {
        let store = InMemoryPledgeStore::new();
        let id = store.create(pledge("a", true)).await.unwrap();

        let err = store.rescind(&id, "user-1").await.unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized(_)));

        let err = store.rescind("missing", "user-1").await.unwrap_err();
        assert!(matches!(err, PledgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_link_refuses_pledge_owned_by_another_user() {
        let store = InMemoryPledgeStore::new();
        let id = store.create(pledge("a", true)).await.unwrap();
        store.link_user(&id, "owner", "owner@example.com").await.unwrap();
        store.link_user(&id, "owner", "owner@example.com").await.unwrap();

        let err = store.link_user(&id, "stranger", "s@example.com").await.unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized(_)));
        let stored = store.get(&id).unwrap();
        assert_eq!(stored.user_id.as_deref(), Some("owner"));
        assert_eq!(stored.user_email.as_deref(), Some("owner@example.com"));
    }

    #[tokio::test]
    async fn test_contact_email_is_first_write_only() {
        let store = InMemoryPledgeStore::new();
        let id = store.create(pledge("a", true)).await.unwrap();
        store.add_email(&id, "first@example.com").await.unwrap();
        // Repeating the same address is harmless
        store.add_email(&id, "first@example.com").await.unwrap();

        let err = store.add_email(&id, "second@example.com").await.unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized(_)));
        assert_eq!(
            store.get(&id).unwrap().contact_email.as_deref(),
            Some("first@example.com")
        );
    }

    #[tokio::test]
    async fn test_rescind_does_not_decrement_count() {
        let store = InMemoryPledgeStore::new();
        let id = store.create(pledge("a", true)).await.unwrap();
        store.link_user(&id, "u", "u@example.com").await.unwrap();
        store.rescind(&id, "u").await.unwrap();
        assert_eq!(store.count_public().await, 1);
    }

    #[tokio::test]
    async fn test_offline_store_degrades_reads() {
        let store = InMemoryPledgeStore::new();
        store.create(pledge("a", true)).await.unwrap();
        store.set_offline(true);

        assert!(store.fetch_public_count().await.is_err());
        assert_eq!(store.count_public().await, 0);
        assert!(store.list_public(10).await.is_empty());
        assert!(store.create(pledge("b", true)).await.is_err());
    }

    #[tokio::test]
    async fn test_live_count_follows_public_creates() {
        let store = InMemoryPledgeStore::new();
        let mut sub = store.subscribe_public_count();
        assert_eq!(sub.next().await, Some(0));

        store.create(pledge("a", true)).await.unwrap();
        assert_eq!(sub.next().await, Some(1));

        // Private pledges are not observable
        store.create(pledge("b", false)).await.unwrap();
        store.create(pledge("c", true)).await.unwrap();
        assert_eq!(sub.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_user_pledges_and_subscribers() {
        let store = InMemoryPledgeStore::new();
        let first = store.create(pledge("a", true)).await.unwrap();
        let second = store.create(pledge("b", false)).await.unwrap();
        store.link_user(&first, "u", "u@example.com").await.unwrap();
        store.link_user(&second, "u", "u@example.com").await.unwrap();

        let mine = store.user_pledges("u").await;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id().as_deref(), Some(second.as_str()));

        store.add_email(&first, "contact@example.com").await.unwrap();
        assert_eq!(
            store.get(&first).unwrap().contact_email.as_deref(),
            Some("contact@example.com")
        );

        store.save_subscriber("x@example.com", Some(&first)).await.unwrap();
        let subs = store.subscribers();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].source, "website");
        assert!(!subs[0].unsubscribed);
    }
}
