//! Identity client
//!
//! Sign-in is optional and only used after a pledge is submitted, so the
//! signer can later manage or rescind it. The identity provider hands the
//! browser a signed token; [`TokenVerifier`] checks it (HS256) and yields
//! the stable user id and email.
//!
//! [`IdentityClient`] tracks the signed-in user and lets callers observe
//! auth-state changes.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::types::{PledgeError, Result};

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

/// Claims carried by identity-provider tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Stable user id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

impl From<IdentityClaims> for Identity {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
            display_name: claims.name,
            photo_url: claims.picture,
        }
    }
}

/// Verifies identity-provider tokens
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
    issuer: Option<String>,
}

impl TokenVerifier {
    /// Returns an error if the secret is too short to be meaningful
    pub fn new(secret: String, issuer: Option<String>) -> Result<Self> {
        if secret.len() < 32 {
            return Err(PledgeError::Config(
                "IDENTITY_SECRET must be at least 32 characters".into(),
            ));
        }
        Ok(Self { secret, issuer })
    }

    /// Verify a token and return who it belongs to
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let mut validation = Validation::default();
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }

        match decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims.into()),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidIssuer => "Unexpected token issuer",
                    _ => "Invalid token",
                };
                Err(PledgeError::Identity(msg.to_string()))
            }
        }
    }

    /// Issue a token for an identity. Used by dev tooling and tests.
    pub fn issue(&self, identity: &Identity, ttl_seconds: u64) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PledgeError::Identity(format!("System time error: {}", e)))?
            .as_secs();

        let claims = IdentityClaims {
            sub: identity.uid.clone(),
            email: identity.email.clone(),
            name: identity.display_name.clone(),
            picture: identity.photo_url.clone(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_seconds,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Source of signed-in identities (popup flow in the browser, bearer token
/// on the server)
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

/// Provider backed by a token the client already obtained
pub struct BearerTokenProvider {
    verifier: TokenVerifier,
    token: String,
}

impl BearerTokenProvider {
    pub fn new(verifier: TokenVerifier, token: impl Into<String>) -> Self {
        Self {
            verifier,
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for BearerTokenProvider {
    async fn sign_in(&self) -> Result<Identity> {
        self.verifier.verify(&self.token)
    }
}

/// Tracks the current user for one visitor
pub struct IdentityClient<P> {
    provider: P,
    current: watch::Sender<Option<Identity>>,
}

impl<P: IdentityProvider> IdentityClient<P> {
    pub fn new(provider: P) -> Self {
        let (current, _rx) = watch::channel(None);
        Self { provider, current }
    }

    pub async fn sign_in(&self) -> Result<Identity> {
        match self.provider.sign_in().await {
            Ok(identity) => {
                info!("Signed in: {}", identity.email.as_deref().unwrap_or(&identity.uid));
                self.current.send_replace(Some(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                warn!("Sign-in error: {}", e);
                Err(e)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.provider.sign_out().await?;
        self.current.send_replace(None);
        Ok(())
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// Observe sign-in and sign-out
    pub fn on_auth_change(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}
