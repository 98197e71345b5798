//! Bearer-token session handling for dashboard clients.
//!
//! The login flow stores the token it receives; every later API call asks
//! [`SessionTokens::authorization`] for the header to attach.  An
//! [`Authorization::Unauthenticated`] answer means the token is missing or
//! expired and the client should send the user back to sign in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::expiry::Timestamp;
use crate::store::ExpiringStore;

/// Key the dashboard keeps its bearer token under.
pub const DEFAULT_TOKEN_KEY: &str = "TOKEN";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Where an unauthenticated client is sent.
pub const SIGN_IN_PATH: &str = "/login";

// ---------------------------------------------------------------------------
// SessionTokens
// ---------------------------------------------------------------------------

/// The bearer token of the current session, kept in an [`ExpiringStore`].
#[derive(Clone)]
pub struct SessionTokens {
    store: ExpiringStore<String>,
    key: String,
}

impl SessionTokens {
    /// Tokens kept under [`DEFAULT_TOKEN_KEY`].
    pub fn new(store: ExpiringStore<String>) -> Self {
        Self::with_key(store, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(store: ExpiringStore<String>, key: impl Into<String>) -> Self {
        SessionTokens {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &ExpiringStore<String> {
        &self.store
    }

    /// Keeps `token` for `ttl` from now.
    pub fn store_token(&self, token: &str, ttl: Duration) -> Result<()> {
        self.store.set_with_ttl(&self.key, &token.to_owned(), ttl)
    }

    /// Keeps `token` until the absolute `deadline`, e.g. a JWT `exp` claim.
    pub fn store_token_until(&self, token: &str, deadline: Timestamp) -> Result<()> {
        self.store.set(&self.key, &token.to_owned(), deadline)
    }

    /// The live token, or `None` if it was never stored or has expired.
    pub fn token(&self) -> Result<Option<String>> {
        self.store.get(&self.key)
    }

    pub fn authorization(&self) -> Result<Authorization> {
        Ok(match self.token()? {
            Some(token) => Authorization::Bearer(token),
            None => {
                debug!(key = %self.key, "no live session token");
                Authorization::Unauthenticated
            }
        })
    }

    /// Forgets the token.  Returns `true` if one was stored.
    pub fn sign_out(&self) -> Result<bool> {
        self.store.remove(&self.key)
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// What to attach to an outgoing API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Bearer(String),
    Unauthenticated,
}

impl Authorization {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Authorization::Bearer(_))
    }

    /// The `Authorization` header value, `Bearer <token>`.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Authorization::Bearer(token) => Some(format!("Bearer {}", token)),
            Authorization::Unauthenticated => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Login contract: POST /api/session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Parent,
}

/// Body of `POST /api/session`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub email: String,
    pub password: String,
    pub user_type: UserType,
}

/// Successful `POST /api/session` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    #[serde(default)]
    pub require_password_change: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default)]
    pub require_password_change: Option<bool>,
    /// Everything else the backend sends about the user.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Error body of a non-2xx API response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}

/// Where a successful login leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Dashboard,
    ChangePassword,
}

impl LoginOutcome {
    pub fn redirect_path(self) -> &'static str {
        match self {
            LoginOutcome::Dashboard => "/dashboard",
            LoginOutcome::ChangePassword => "/change-password",
        }
    }
}

impl SessionResponse {
    /// A password change is required if either the user record or the
    /// response envelope says so.
    pub fn next_step(&self) -> LoginOutcome {
        let flagged = self.user.require_password_change.unwrap_or(false)
            || self.require_password_change.unwrap_or(false);
        if flagged {
            LoginOutcome::ChangePassword
        } else {
            LoginOutcome::Dashboard
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Paths of the dashboard's backend API, relative to its base URL.
pub mod routes {
    pub const SESSION: &str = "/api/session";
    pub const USERS: &str = "/api/users";
    pub const VEHICLES: &str = "/api/vehicles";
    pub const USER_AGENCIES: &str = "/useragences";

    use std::fmt::Write;

    pub fn user(id: &str) -> String {
        format!("{}/{}", USERS, encode_component(id))
    }

    pub fn vehicle(id: &str) -> String {
        format!("{}/{}", VEHICLES, encode_component(id))
    }

    pub fn user_agencies(user_id: &str) -> String {
        format!("{}?userId={}", USER_AGENCIES, encode_component(user_id))
    }

    /// Percent-encodes every byte outside the RFC 3986 unreserved set.
    fn encode_component(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for b in raw.bytes() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                out.push(b as char);
            } else {
                let _ = write!(out, "%{:02X}", b);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
