//! Pledgewall - pledge collection service
//!
//! Visitors sign a commitment pledge (drawn signature, name, privacy
//! choice). Pledges go to a MongoDB store with a local JSON fallback, and a
//! live public count plus a rolling wall of public names is served back.
//!
//! ## Components
//!
//! - **signature**: signature pad adapter, SVG and PNG export
//! - **store**: remote pledge store (MongoDB or in-memory) with a live count
//! - **fallback**: local pledge journal used when the store is unreachable
//! - **identity**: optional sign-in, token verification
//! - **workflow**: validation, two-tier persistence and the success view
//! - **counter**: one count mirrored into every display slot, count-up animation
//! - **social_proof**: recent public names as tags

pub mod config;
pub mod counter;
pub mod db;
pub mod fallback;
pub mod identity;
pub mod pledge;
pub mod routes;
pub mod server;
pub mod signature;
pub mod social_proof;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{PledgeError, Result};
