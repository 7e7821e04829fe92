//! Session identity and the per-process session context.

mod context;

use std::collections::HashMap;

pub use context::SessionContext;

const OWNER_ID: &str = "sub";
const EMAIL: &str = "email";

/// Identity claims of the signed-in user, as the auth provider hands them out.
///
/// The core only ever asks "who is the current owner, if anyone":
///
/// ```json
/// {
///   "sub": "8c1f2e9a-...",
///   "email": "owner@shop.example"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    claims: HashMap<String, String>,
}

impl Session {
    /// A session with no identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session for `owner_id`.
    pub fn signed_in(owner_id: impl Into<String>) -> Self {
        let mut session = Self::default();
        session.set(OWNER_ID, owner_id);
        session
    }

    /// Create a session from a map of claims.
    pub fn from_claims(claims: HashMap<String, String>) -> Self {
        Self { claims }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.set(EMAIL, email);
        self
    }

    /// The owner identity (`sub`). Blank values count as absent.
    pub fn owner_id(&self) -> Option<&str> {
        self.get(OWNER_ID).filter(|id| !id.trim().is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.get(EMAIL)
    }

    pub fn is_signed_in(&self) -> bool {
        self.owner_id().is_some()
    }

    /// Get a claim by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(|v| v.as_str())
    }

    /// Set a claim.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.claims.insert(key.into(), value.into());
    }

    /// Get all claims.
    pub fn claims(&self) -> &HashMap<String, String> {
        &self.claims
    }
}
