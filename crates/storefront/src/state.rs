//! Application state shared across the storefront.

use std::sync::Arc;

use tracing::instrument;

use crate::backend::{BackendClient, CommerceApi, Identity};
use crate::config::StorefrontConfig;
use crate::error::Result;
use crate::payment::{PaymentError, PaymentProcessor, StripeClient};
use crate::query::QueryCache;
use crate::services::{
    AuthService, AuthTransition, CartService, CheckoutService, Registration, WishlistService,
};
use crate::storage::{FileStore, KeyValueStore, StorageError};
use crate::stores::ClientStores;

/// Application state shared across the storefront.
///
/// This struct is cheaply cloneable via `Arc`. Every clone sees the same
/// stores and query cache, so an optimistic write made through one handle
/// is immediately visible through all others.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    storage: Arc<dyn KeyValueStore>,
    stores: Arc<ClientStores>,
    cache: QueryCache,
    cart: CartService,
    wishlist: WishlistService,
    auth: AuthService,
    checkout: CheckoutService,
}

impl AppState {
    /// Create the state from configuration: HTTP backend client, payment
    /// processor (if configured) and file-backed storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built or the payment
    /// configuration is invalid.
    pub fn new(config: StorefrontConfig) -> Result<Self> {
        let api: Arc<dyn CommerceApi> = Arc::new(BackendClient::new(&config.backend)?);
        let payments: Option<Arc<dyn PaymentProcessor>> =
            match StripeClient::new(&config.payment) {
                Ok(client) => Some(Arc::new(client)),
                Err(PaymentError::NotConfigured) => {
                    tracing::warn!("Payment processor not configured; card payments disabled");
                    None
                }
                Err(e) => return Err(e.into()),
            };
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.storage_dir.clone()));

        Ok(Self::with_parts(config, api, payments, storage))
    }

    /// Assemble the state from explicit parts.
    ///
    /// Persisted stores are rehydrated (running the compare-list migration)
    /// and any persisted bearer token is installed on `api`.
    #[must_use]
    pub fn with_parts(
        config: StorefrontConfig,
        api: Arc<dyn CommerceApi>,
        payments: Option<Arc<dyn PaymentProcessor>>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let stores = Arc::new(ClientStores::load(&storage));
        let cache = QueryCache::new(config.query.clone());

        let cart = CartService::new(api.clone(), cache.clone(), stores.clone());
        let wishlist = WishlistService::new(api.clone(), cache.clone(), stores.clone());
        let auth = AuthService::new(api.clone(), cache.clone(), stores.clone());
        let checkout = CheckoutService::new(api, payments, cart.clone());

        auth.install_persisted_token();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                storage,
                stores,
                cache,
                cart,
                wishlist,
                auth,
                checkout,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.storage
    }

    #[must_use]
    pub fn stores(&self) -> &ClientStores {
        &self.inner.stores
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistService {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Confirm the persisted session with the server. A rejected session
    /// also drops the account's wishlist from local state.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be checked; the persisted
    /// session is kept.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<Option<Identity>> {
        let was_authenticated = self.inner.auth.is_authenticated();
        let identity = self.inner.auth.reconcile().await?;
        if was_authenticated && identity.is_none() {
            self.inner.wishlist.on_logout().await;
        }
        Ok(identity)
    }

    /// Sign in with email and password, then merge the guest wishlist.
    /// Signing in over another account's session first drops that
    /// account's wishlist and cart.
    ///
    /// # Errors
    ///
    /// Returns an error if sign-in fails. A failed wishlist merge is logged
    /// and leaves the guest list in place.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTransition> {
        let transition = self.inner.auth.login(email, password).await?;
        self.after_sign_in(transition).await;
        Ok(transition)
    }

    /// Register, then merge the guest wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    pub async fn register(&self, registration: Registration) -> Result<AuthTransition> {
        let transition = self.inner.auth.register(registration).await?;
        self.after_sign_in(transition).await;
        Ok(transition)
    }

    /// Complete Google sign-in, then merge the guest wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the code exchange fails.
    pub async fn login_with_google(&self, code: &str, redirect_uri: &str) -> Result<AuthTransition> {
        let transition = self.inner.auth.login_with_google(code, redirect_uri).await?;
        self.after_sign_in(transition).await;
        Ok(transition)
    }

    /// Sign out and drop account-owned local state.
    pub async fn logout(&self) {
        self.inner.auth.logout().await;
        self.inner.wishlist.on_logout().await;
    }

    /// Write every store to storage, surfacing the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn flush(&self) -> std::result::Result<(), StorageError> {
        let stores = &self.inner.stores;
        stores.auth.flush()?;
        stores.ui.flush()?;
        stores.wishlist.flush()?;
        stores.compare.flush()?;
        stores.cart_id.flush()
    }

    async fn after_sign_in(&self, transition: AuthTransition) {
        match transition {
            AuthTransition::Renewed => return,
            AuthTransition::SignedIn => {}
            AuthTransition::SwitchedAccount => {
                // Nothing from the previous account carries over.
                self.inner.wishlist.on_logout().await;
                self.inner.cart.forget().await;
            }
        }
        if let Err(e) = self.inner.wishlist.merge_guest_wishlist().await {
            tracing::warn!(error = %e, "Guest wishlist merge failed; keeping guest list");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use secrecy::SecretString;

    use super::*;
    use crate::backend::BackendError;
    use crate::config::{BackendConfig, PaymentConfig, QueryConfig};
    use crate::storage::{MemoryStore, keys};
    use crate::stores::WishlistItem;
    use crate::testing::FakeCommerce;
    use atelier_core::ProductId;

    fn test_config() -> StorefrontConfig {
        StorefrontConfig {
            backend: BackendConfig {
                base_url: "http://localhost:9000".to_string(),
                publishable_key: SecretString::from("pk_test".to_string()),
                region_id: None,
                timeout: std::time::Duration::from_secs(5),
            },
            payment: PaymentConfig {
                api_url: "http://localhost:12111".to_string(),
                publishable_key: None,
                provider_id: "pp_stripe_stripe".to_string(),
            },
            query: QueryConfig {
                retry_base_delay: std::time::Duration::from_millis(1),
                ..QueryConfig::default()
            },
            site_url: "http://localhost:3000".to_string(),
            storage_dir: PathBuf::from(".atelier-test"),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    fn state_with(api: &Arc<FakeCommerce>, storage: Arc<dyn KeyValueStore>) -> AppState {
        AppState::with_parts(test_config(), api.clone(), None, storage)
    }

    #[tokio::test]
    async fn test_login_merges_guest_wishlist() {
        let api = Arc::new(FakeCommerce::default());
        api.set_favorites(&["c"]);
        let state = state_with(&api, Arc::new(MemoryStore::new()));
        state
            .wishlist()
            .add(WishlistItem::bare(ProductId::new("a")))
            .await
            .unwrap();

        let transition = state.login("ines@example.com", "correct-horse").await.unwrap();

        assert_eq!(transition, AuthTransition::SignedIn);
        let ids: Vec<String> = state
            .wishlist()
            .items()
            .iter()
            .map(|item| item.product_id.to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_merge_failure_does_not_fail_login() {
        let api = Arc::new(FakeCommerce::default());
        let state = state_with(&api, Arc::new(MemoryStore::new()));
        state
            .wishlist()
            .add(WishlistItem::bare(ProductId::new("a")))
            .await
            .unwrap();
        api.fail_next(
            "sync_favorites",
            BackendError::Api {
                status: 400,
                message: "bad ids".to_string(),
            },
        );

        assert!(state.login("ines@example.com", "correct-horse").await.is_ok());
        assert_eq!(state.wishlist().len(), 1);
    }

    #[tokio::test]
    async fn test_persisted_session_survives_restart() {
        let api = Arc::new(FakeCommerce::default());
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = state_with(&api, storage.clone());
        first.login("ines@example.com", "correct-horse").await.unwrap();
        api.set_access_token(None);

        let second = state_with(&api, storage);
        assert!(second.auth().is_authenticated());
        assert_eq!(api.token().as_deref(), Some("tok_ines"));
        assert!(second.hydrate().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_switching_accounts_loads_new_wishlist() {
        let api = Arc::new(FakeCommerce::default());
        let state = state_with(&api, Arc::new(MemoryStore::new()));
        api.set_favorites(&["ines_item"]);
        state.login("ines@example.com", "correct-horse").await.unwrap();
        state
            .cart()
            .add_item(crate::services::LineItemDraft {
                variant_id: atelier_core::VariantId::new("variant_bag"),
                product_id: None,
                quantity: 1,
                title: "Quilted Bag".to_string(),
                thumbnail: None,
                unit_price: 100.into(),
            })
            .await
            .unwrap();

        api.set_favorites(&["marco_item"]);
        let transition = state.login("marco@example.com", "battery-staple").await.unwrap();

        assert_eq!(transition, AuthTransition::SwitchedAccount);
        let ids: Vec<String> = state
            .wishlist()
            .items()
            .iter()
            .map(|item| item.product_id.to_string())
            .collect();
        assert_eq!(ids, vec!["marco_item"]);
        assert_eq!(state.cart().cart_id(), None);
    }

    #[tokio::test]
    async fn test_rejected_session_clears_wishlist() {
        let api = Arc::new(FakeCommerce::default());
        api.set_favorites(&["c"]);
        let state = state_with(&api, Arc::new(MemoryStore::new()));
        state.login("ines@example.com", "correct-horse").await.unwrap();
        state.cache().clear();

        api.fail_next("me", BackendError::Unauthorized);
        assert!(state.hydrate().await.unwrap().is_none());

        assert!(!state.auth().is_authenticated());
        assert!(state.wishlist().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_account_state() {
        let api = Arc::new(FakeCommerce::default());
        api.set_favorites(&["c"]);
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let state = state_with(&api, storage.clone());
        state.login("ines@example.com", "correct-horse").await.unwrap();

        state.logout().await;

        assert!(!state.auth().is_authenticated());
        assert!(state.wishlist().is_empty());
        assert!(storage.get_raw(keys::AUTH).unwrap().is_none());
    }
}
