//! Shared types for pledgewall

mod error;

pub use error::{PledgeError, Result};
