//! Pledge naming and timestamp helpers

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Privacy choice from the pledge form radio group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
}

impl Privacy {
    pub fn is_public(self) -> bool {
        matches!(self, Privacy::Public)
    }
}

/// Name shown for a pledge given the privacy choice
pub fn display_name(full_name: &str, privacy: Privacy) -> String {
    match privacy {
        Privacy::Public => full_name.to_string(),
        Privacy::Private => private_display_name(full_name),
    }
}

/// "Sarah Murphy" becomes "Sarah M."; a single name is kept as is.
pub fn private_display_name(full_name: &str) -> String {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, .., last] => {
            let initial: String = last
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_default();
            format!("{} {}.", first, initial)
        }
    }
}

/// Current time as ISO-8601 with millisecond precision, UTC
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
