//! Database schemas for pledgewall
//!
//! Defines MongoDB document structures for pledges and email subscribers.

mod pledge;
mod subscriber;

pub use pledge::{CommitmentFlags, Commitments, PledgeDoc, PublicPledge, PLEDGE_COLLECTION};
pub use subscriber::{SubscriberDoc, SUBSCRIBER_COLLECTION, SUBSCRIBER_SOURCE};
