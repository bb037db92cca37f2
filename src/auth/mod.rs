//! Credential acquisition.
//!
//! The transport only needs a bearer token that is valid right now; how it is
//! obtained is up to the [`Authenticator`] implementation.

mod oauth;

pub use oauth::OAuthAuthenticator;

use crate::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use keyring::Entry;
use std::env;

/// A bearer token together with the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// True when the credential expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: ChronoDuration) -> bool {
        self.expires_at - now <= margin
    }
}

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn credential(&self) -> Result<Credential>;
}

/// Fixed token that never expires. Useful for pre-issued tokens and tests.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for StaticToken {
    async fn credential(&self) -> Result<Credential> {
        Ok(Credential::new(
            self.token.clone(),
            Utc::now() + ChronoDuration::days(36_500),
        ))
    }
}

/// Resolve the OAuth authorization key: keyring entry first, then `CHATFN_AUTH_KEY`.
pub fn lookup_auth_key(scope: &str) -> Option<String> {
    if let Ok(entry) = Entry::new("chatfn", scope) {
        if let Ok(key) = entry.get_password() {
            return Some(key);
        }
    }
    env::var("CHATFN_AUTH_KEY").ok()
}
