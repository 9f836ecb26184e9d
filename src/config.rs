//! Configuration for pledgewall
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Pledgewall - pledge collection service
#[derive(Parser, Debug, Clone)]
#[command(name = "pledgewall")]
#[command(about = "Pledge collection service with live public count")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store if MongoDB is down, dev token secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "pledgewall")]
    pub mongodb_db: String,

    /// File backing the local pledge fallback list
    #[arg(long, env = "FALLBACK_PATH", default_value = "./data/pledges.json")]
    pub fallback_path: PathBuf,

    /// Shared secret used to verify identity-provider tokens (HS256)
    #[arg(long, env = "IDENTITY_SECRET")]
    pub identity_secret: Option<String>,

    /// Expected token issuer (optional)
    #[arg(long, env = "IDENTITY_ISSUER")]
    pub identity_issuer: Option<String>,

    /// How often the live public count is recomputed from the store
    #[arg(long, env = "COUNT_REFRESH_MS", default_value = "5000")]
    pub count_refresh_ms: u64,

    /// Commitment form variant: "flags" (four checkboxes) or "single"
    #[arg(long, env = "FORM_VARIANT", default_value = "flags")]
    pub form_variant: String,

    /// Public URL of the pledge page, used in share links
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:8080/")]
    pub site_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Get effective identity secret (uses default in dev mode)
    pub fn identity_secret(&self) -> Option<String> {
        match (&self.identity_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-identity-secret-0001".to_string()),
            (None, false) => None,
        }
    }

    pub fn count_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.count_refresh_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.identity_secret.is_none() {
            return Err("IDENTITY_SECRET is required in production mode".to_string());
        }

        if self.count_refresh_ms == 0 {
            return Err("COUNT_REFRESH_MS must be greater than zero".to_string());
        }

        match self.form_variant.as_str() {
            "flags" | "single" => {}
            other => return Err(format!("FORM_VARIANT must be 'flags' or 'single', got '{}'", other)),
        }

        Ok(())
    }
}
