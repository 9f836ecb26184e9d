//! Remote pledge store
//!
//! [`PledgeStore`] is the client-side view of the hosted `pledges` and
//! `subscribers` collections. Every operation returns a tagged
//! [`PledgeError`] instead of panicking; callers pick their own fallback.
//! The read paths have degrading variants (`count_public`, `list_public`,
//! `user_pledges`) that log and return 0 or an empty list.
//!
//! Only public pledges are observable through counts, listings and the live
//! subscription.

pub mod memory;
pub mod mongo;

pub use memory::InMemoryPledgeStore;
pub use mongo::{spawn_count_refresher, MongoPledgeStore};

use tokio::sync::watch;
use tracing::warn;

use crate::db::schemas::{PledgeDoc, PublicPledge};
use crate::types::Result;

/// Default number of pledges returned by a public listing
pub const DEFAULT_PUBLIC_LIMIT: usize = 10;

#[async_trait::async_trait]
pub trait PledgeStore: Send + Sync {
    /// Write a new pledge, stamping `created_at`. Returns the new id.
    async fn create(&self, pledge: PledgeDoc) -> Result<String>;

    /// Number of public pledges
    async fn fetch_public_count(&self) -> Result<u64>;

    /// Up to `max` public pledges, newest first
    async fn fetch_public(&self, max: usize) -> Result<Vec<PublicPledge>>;

    /// Live public count: current value on subscribe, then every change
    fn subscribe_public_count(&self) -> CountSubscription;

    /// Attach a signed-in user to a pledge. A pledge already linked to
    /// another user is refused with `Unauthorized`; relinking the same user
    /// is accepted.
    async fn link_user(&self, pledge_id: &str, user_id: &str, user_email: &str) -> Result<()>;

    /// Mark a pledge rescinded. Only the linked user may do this.
    async fn rescind(&self, pledge_id: &str, user_id: &str) -> Result<()>;

    /// Attach a contact email to a pledge. The first email wins; a later
    /// different email is refused with `Unauthorized`.
    async fn add_email(&self, pledge_id: &str, email: &str) -> Result<()>;

    /// Pledges linked to a user, newest first
    async fn fetch_user_pledges(&self, user_id: &str) -> Result<Vec<PledgeDoc>>;

    /// Record an email-capture event. Returns the subscriber id.
    async fn save_subscriber(&self, email: &str, pledge_id: Option<&str>) -> Result<String>;

    async fn count_public(&self) -> u64 {
        match self.fetch_public_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Public pledge count unavailable: {}", e);
                0
            }
        }
    }

    async fn list_public(&self, max: usize) -> Vec<PublicPledge> {
        match self.fetch_public(max).await {
            Ok(pledges) => pledges,
            Err(e) => {
                warn!("Public pledge listing unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn user_pledges(&self, user_id: &str) -> Vec<PledgeDoc> {
        match self.fetch_user_pledges(user_id).await {
            Ok(pledges) => pledges,
            Err(e) => {
                warn!("Pledges for user {} unavailable: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

/// Publishing side of the live public count
#[derive(Debug)]
pub struct CountPublisher {
    tx: watch::Sender<u64>,
}

impl CountPublisher {
    pub fn new(initial: u64) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a freshly computed count. Subscribers are woken only on change.
    pub fn publish(&self, count: u64) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        })
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> CountSubscription {
        CountSubscription {
            rx: self.tx.subscribe(),
            primed: false,
        }
    }
}

/// Handle to a live public-count subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct CountSubscription {
    rx: watch::Receiver<u64>,
    primed: bool,
}

impl CountSubscription {
    /// Next count. The first call resolves immediately with the current
    /// value; later calls wait for a change. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<u64> {
        if !self.primed {
            self.primed = true;
            return Some(*self.rx.borrow_and_update());
        }
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_pushes_current_then_changes() {
        let publisher = CountPublisher::new(3);
        let mut sub = publisher.subscribe();

        assert_eq!(sub.next().await, Some(3));

        // Unchanged values do not wake subscribers
        assert!(!publisher.publish(3));
        let pending = tokio::time::timeout(Duration::from_millis(20), sub.next()).await;
        assert!(pending.is_err());

        assert!(publisher.publish(4));
        assert_eq!(sub.next().await, Some(4));
    }

    #[tokio::test]
    async fn test_subscription_ends_with_publisher() {
        let publisher = CountPublisher::new(0);
        let mut sub = publisher.subscribe();
        assert_eq!(sub.next().await, Some(0));
        drop(publisher);
        assert_eq!(sub.next().await, None);
    }
}
