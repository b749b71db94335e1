//! Wishlist service.
//!
//! Guests keep their wishlist in local storage only. Once signed in, the
//! server list is canonical: every change is applied optimistically to both
//! the local store and the query cache, and the list the server returns
//! replaces both. On sign-in the guest list is merged into the account
//! exactly once.

use std::future::Future;
use std::sync::Arc;

use tracing::instrument;

use atelier_core::ProductId;

use super::action::{ActionState, ActionStatus};
use crate::backend::{BackendError, CommerceApi, Favorite};
use crate::error::{Result, StorefrontError, add_breadcrumb};
use crate::query::{QueryCache, QueryKey, mutate_optimistically};
use crate::stores::{AuthState, ClientStores, WishlistItem, WishlistState};

/// Wishlist operations. Cheap to clone.
#[derive(Clone)]
pub struct WishlistService {
    inner: Arc<WishlistServiceInner>,
}

struct WishlistServiceInner {
    api: Arc<dyn CommerceApi>,
    cache: QueryCache,
    stores: Arc<ClientStores>,
    action: ActionState,
}

impl WishlistService {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, cache: QueryCache, stores: Arc<ClientStores>) -> Self {
        Self {
            inner: Arc::new(WishlistServiceInner {
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
    pub fn items(&self) -> Vec<WishlistItem> {
        self.inner.stores.wishlist.read(|w| w.items().to_vec())
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.inner.stores.wishlist.read(|w| w.contains(product_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.stores.wishlist.read(WishlistState::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Save a product. Saving an already-saved product does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change; local state is
    /// restored.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add(&self, item: WishlistItem) -> Result<()> {
        if self.contains(&item.product_id) {
            return Ok(());
        }
        if !self.is_authenticated() {
            self.inner.stores.wishlist.update(|w| w.add(item));
            return Ok(());
        }

        let product_id = item.product_id.clone();
        let api = &self.inner.api;
        self.sync_change(
            move |w| {
                w.add(item.clone());
            },
            api.add_favorite(&product_id),
        )
        .await?;
        add_breadcrumb(
            "wishlist",
            "Saved product",
            Some(&[("product_id", product_id.as_str())]),
        );
        Ok(())
    }

    /// Remove a saved product. Removing an unsaved product does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change; local state is
    /// restored.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<()> {
        if !self.contains(product_id) {
            return Ok(());
        }
        if !self.is_authenticated() {
            self.inner.stores.wishlist.update(|w| w.remove(product_id));
            return Ok(());
        }

        let api = &self.inner.api;
        self.sync_change(
            |w| {
                w.remove(product_id);
            },
            api.remove_favorite(product_id),
        )
        .await?;
        add_breadcrumb(
            "wishlist",
            "Removed product",
            Some(&[("product_id", product_id.as_str())]),
        );
        Ok(())
    }

    /// Save or unsave a product. Returns whether it is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change.
    pub async fn toggle(&self, item: WishlistItem) -> Result<bool> {
        if self.contains(&item.product_id) {
            self.remove(&item.product_id).await?;
            Ok(false)
        } else {
            self.add(item).await?;
            Ok(true)
        }
    }

    /// Merge the guest wishlist into the account after sign-in.
    ///
    /// A non-empty local list is sent once to the server's merge endpoint;
    /// an empty one just loads the account's list. Either way the server's
    /// canonical list replaces local state.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached; the local list is
    /// kept so the merge can be retried.
    #[instrument(skip(self))]
    pub async fn merge_guest_wishlist(&self) -> Result<Vec<WishlistItem>> {
        self.inner
            .action
            .track(async {
                let local = self.inner.stores.wishlist.snapshot();
                let favorites = if local.is_empty() {
                    self.inner.api.list_favorites().await?
                } else {
                    tracing::info!(count = local.len(), "Merging guest wishlist");
                    self.inner.api.sync_favorites(local.ids()).await?
                };

                let items = self.adopt(favorites).await;
                Ok(items)
            })
            .await
    }

    /// Refetch the account's list. Guests get their local list.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached after retries.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Vec<WishlistItem>> {
        if !self.is_authenticated() {
            return Ok(self.items());
        }

        self.inner.cache.invalidate(QueryKey::Wishlist).await;
        let api = &self.inner.api;
        let stores = &self.inner.stores;
        let items: Vec<WishlistItem> = self
            .inner
            .cache
            .fetch(QueryKey::Wishlist, || async move {
                let favorites = api.list_favorites().await?;
                Ok(stores.wishlist.read(|local| merge_details(favorites, local)))
            })
            .await?;

        self.inner
            .stores
            .wishlist
            .update(|w| w.replace_all(items.clone()));
        Ok(items)
    }

    /// Drop the account's list from this device after sign-out.
    pub async fn on_logout(&self) {
        self.inner.stores.wishlist.reset();
        self.inner.cache.remove(QueryKey::Wishlist).await;
    }

    fn is_authenticated(&self) -> bool {
        self.inner.stores.auth.read(AuthState::is_authenticated)
    }

    /// Apply `change` to the store and cache, then adopt the server's list
    /// or restore both on failure.
    async fn sync_change<F>(&self, change: impl Fn(&mut WishlistState), request: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<Vec<Favorite>, BackendError>>,
    {
        self.inner
            .action
            .track(async {
                let stores = &self.inner.stores;
                let snapshot = stores.wishlist.snapshot();
                stores.wishlist.update(&change);

                let mut expected = snapshot.clone();
                change(&mut expected);

                let result = mutate_optimistically(
                    &self.inner.cache,
                    QueryKey::Wishlist,
                    |_: Option<Vec<WishlistItem>>| Some(expected.items().to_vec()),
                    async {
                        let favorites = request.await?;
                        Ok::<_, BackendError>(merge_details(favorites, &expected))
                    },
                )
                .await;

                match result {
                    Ok(items) => {
                        stores.wishlist.update(|w| w.replace_all(items));
                        Ok(())
                    }
                    Err(e) => {
                        stores.wishlist.replace(snapshot);
                        Err(StorefrontError::from(e))
                    }
                }
            })
            .await
    }

    async fn adopt(&self, favorites: Vec<Favorite>) -> Vec<WishlistItem> {
        let stores = &self.inner.stores;
        let items = stores
            .wishlist
            .read(|local| merge_details(favorites, local));
        stores.wishlist.update(|w| w.replace_all(items.clone()));
        self.inner.cache.set(QueryKey::Wishlist, items.clone()).await;
        items
    }
}

/// Convert server favorites, filling in display details the server omitted
/// from the matching local item.
fn merge_details(favorites: Vec<Favorite>, local: &WishlistState) -> Vec<WishlistItem> {
    favorites
        .into_iter()
        .map(|favorite| {
            if favorite.product.is_none()
                && let Some(known) = local
                    .items()
                    .iter()
                    .find(|item| item.product_id == favorite.product_id)
            {
                return known.clone();
            }
            WishlistItem::from(favorite)
        })
        .collect()
}
