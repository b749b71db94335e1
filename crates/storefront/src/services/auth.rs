//! Authentication service.
//!
//! Sessions are persisted optimistically from the login response and
//! reconciled against `GET /auth/me` later. Reconciliation fails open: only
//! an explicit 401 ends the session, so a flaky network never signs the
//! customer out.

use std::sync::Arc;

use tracing::instrument;

use atelier_core::Email;

use super::action::{ActionState, ActionStatus};
use crate::backend::{
    AuthResponse, AuthUser, BackendError, CommerceApi, Identity, LoginInput, RegisterInput,
};
use crate::error::{Result, StorefrontError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::query::{QueryCache, QueryKey};
use crate::stores::{AuthState, ClientStores};

/// Effect of a successful sign-in on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTransition {
    /// Guest became authenticated; guest state should be merged.
    SignedIn,
    /// The same account signed in again.
    Renewed,
    /// A different account replaced the stored session; the previous
    /// account's local state must be dropped.
    SwitchedAccount,
}

/// Account details for registration.
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Authentication operations. Cheap to clone.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<AuthServiceInner>,
}

struct AuthServiceInner {
    api: Arc<dyn CommerceApi>,
    cache: QueryCache,
    stores: Arc<ClientStores>,
    action: ActionState,
}

impl AuthService {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, cache: QueryCache, stores: Arc<ClientStores>) -> Self {
        Self {
            inner: Arc::new(AuthServiceInner {
                api,
                cache,
                stores,
                action: ActionState::default(),
            }),
        }
    }

    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.inner.action.status()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.stores.auth.read(AuthState::is_authenticated)
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.stores.auth.read(|a| a.user.clone())
    }

    /// Install the persisted bearer token on the backend client.
    pub fn install_persisted_token(&self) {
        let token = self
            .inner
            .stores
            .auth
            .read(|a| a.access_token().map(String::from));
        if let Some(user) = self.current_user() {
            set_sentry_user(&user.id, Some(&user.email));
        }
        self.inner.api.set_access_token(token);
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed email or rejected credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTransition> {
        self.inner
            .action
            .track(async {
                let input = LoginInput {
                    email: parse_email(email)?,
                    password: password.to_string(),
                };
                let response = self.inner.api.login(&input).await?;
                Ok(self.start_session(response).await)
            })
            .await
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid details or if the account exists.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<AuthTransition> {
        self.inner
            .action
            .track(async {
                if registration.password.chars().count() < 8 {
                    return Err(StorefrontError::InvalidInput(
                        "Password must be at least 8 characters.".to_string(),
                    ));
                }
                let input = RegisterInput {
                    email: parse_email(&registration.email)?,
                    password: registration.password,
                    first_name: registration.first_name.trim().to_string(),
                    last_name: registration.last_name.trim().to_string(),
                };
                let response = self.inner.api.register(&input).await?;
                Ok(self.start_session(response).await)
            })
            .await
    }

    /// Complete a Google OAuth sign-in with the authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the code.
    #[instrument(skip(self, code))]
    pub async fn login_with_google(&self, code: &str, redirect_uri: &str) -> Result<AuthTransition> {
        self.inner
            .action
            .track(async {
                let response = self
                    .inner
                    .api
                    .exchange_google_code(code, redirect_uri)
                    .await?;
                Ok(self.start_session(response).await)
            })
            .await
    }

    /// Check the persisted session against the server.
    ///
    /// Returns the confirmed identity, or `None` if there is no session or
    /// the server rejected the token (the session is then cleared).
    ///
    /// # Errors
    ///
    /// Returns any other failure; the persisted session is kept.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<Option<Identity>> {
        if !self.is_authenticated() {
            return Ok(None);
        }

        let api = &self.inner.api;
        match self
            .inner
            .cache
            .fetch(QueryKey::AuthSession, || api.me())
            .await
        {
            Ok(identity) => {
                let confirmed = identity.clone();
                self.inner.stores.auth.update(|a| a.set_identity(confirmed));
                Ok(Some(identity))
            }
            Err(BackendError::Unauthorized) => {
                tracing::info!("Session rejected by server, signing out locally");
                self.end_session().await;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed, keeping persisted session");
                Err(e.into())
            }
        }
    }

    /// Sign out. The server call is best-effort; local state is always
    /// cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(e) = self.inner.api.logout().await {
            tracing::warn!(error = %e, "Server logout failed");
        }
        self.end_session().await;
        add_breadcrumb("auth", "Signed out", None);
    }

    async fn start_session(&self, response: AuthResponse) -> AuthTransition {
        let previous = self
            .inner
            .stores
            .auth
            .read(|a| a.is_authenticated().then(|| a.user.as_ref().map(|u| u.id.clone())))
            .flatten();
        let identity = Identity {
            user: response.user.clone(),
            customer: response.customer.clone(),
        };
        let token = response.token.clone();
        let identity_id = identity.user.id.clone();

        set_sentry_user(&identity.user.id, Some(&identity.user.email));
        self.inner.stores.auth.update(|a| a.set_session(response));
        self.inner.api.set_access_token(Some(token));
        self.inner.cache.set(QueryKey::AuthSession, identity).await;
        add_breadcrumb("auth", "Signed in", None);

        match previous {
            None => AuthTransition::SignedIn,
            Some(id) if id == identity_id => AuthTransition::Renewed,
            Some(id) => {
                tracing::info!(previous_user = %id, user = %identity_id, "Account switched");
                AuthTransition::SwitchedAccount
            }
        }
    }

    async fn end_session(&self) {
        self.inner.stores.auth.reset();
        self.inner.api.set_access_token(None);
        self.inner.cache.remove(QueryKey::AuthSession).await;
        clear_sentry_user();
    }
}

fn parse_email(email: &str) -> Result<Email> {
    Email::parse(email).map_err(|e| StorefrontError::InvalidInput(e.to_string()))
}
