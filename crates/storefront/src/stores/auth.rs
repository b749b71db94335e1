//! Persisted authentication session.

use serde::{Deserialize, Serialize};

use crate::backend::{AuthResponse, AuthUser, Customer, Identity};

/// The signed-in account and its bearer token.
///
/// Written optimistically from the login response, then reconciled against
/// `GET /auth/me`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub customer: Option<Customer>,
    token: Option<String>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("user", &self.user)
            .field("customer", &self.customer)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AuthState {
    /// Adopt a fresh session from a login/register/OAuth response.
    pub fn set_session(&mut self, response: AuthResponse) {
        self.user = Some(response.user);
        self.customer = response.customer;
        self.token = Some(response.token);
    }

    /// Replace the identity with the server's view, keeping the token.
    pub fn set_identity(&mut self, identity: Identity) {
        self.user = Some(identity.user);
        self.customer = identity.customer;
    }

    /// Forget the session.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether a user and token are both present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    /// Bearer token for backend requests.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
