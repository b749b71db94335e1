//! Cart service.
//!
//! The backend owns the cart; this service keeps the active cart ID in
//! persistent storage and the last known cart in the query cache. Line
//! edits are applied optimistically and rolled back on failure. Totals
//! are never computed locally: the optimistic copy only changes lines,
//! and the server's response replaces it wholesale.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use atelier_core::{CartId, Email, LineItemId, ProductId, ShippingOptionId, VariantId};

use super::CheckoutError;
use super::action::{ActionState, ActionStatus};
use crate::backend::{
    Address, BackendError, Cart, CommerceApi, CreateCartInput, LineItem, ShippingOption,
    UpdateCartInput,
};
use crate::error::{Result, StorefrontError, add_breadcrumb};
use crate::query::{QueryCache, QueryKey, mutate_optimistically};
use crate::stores::ClientStores;

/// A line to add, with enough detail to render it before the server
/// confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemDraft {
    pub variant_id: VariantId,
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub title: String,
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
}

impl LineItemDraft {
    fn placeholder(&self) -> LineItem {
        LineItem {
            id: LineItemId::new(format!("optimistic_{}", Uuid::new_v4().simple())),
            variant_id: self.variant_id.clone(),
            product_id: self.product_id.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Cart operations. Cheap to clone.
#[derive(Clone)]
pub struct CartService {
    inner: Arc<CartServiceInner>,
}

struct CartServiceInner {
    api: Arc<dyn CommerceApi>,
    cache: QueryCache,
    stores: Arc<ClientStores>,
    action: ActionState,
}

impl CartService {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, cache: QueryCache, stores: Arc<ClientStores>) -> Self {
        Self {
            inner: Arc::new(CartServiceInner {
                api,
                cache,
                stores,
                action: ActionState::default(),
            }),
        }
    }

    /// Pending flag and last error of cart operations.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.inner.action.status()
    }

    /// ID of the active cart, if any.
    #[must_use]
    pub fn cart_id(&self) -> Option<CartId> {
        self.inner.stores.cart_id.snapshot()
    }

    /// The active cart.
    ///
    /// Returns `None` when no cart exists yet or the stored cart has
    /// disappeared server-side (the stale ID is forgotten).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached after retries.
    #[instrument(skip(self))]
    pub async fn current(&self) -> Result<Option<Cart>> {
        let Some(cart_id) = self.cart_id() else {
            return Ok(None);
        };

        match self.fetch(&cart_id).await {
            Ok(cart) => Ok(Some(cart)),
            Err(BackendError::NotFound(_)) => {
                tracing::info!(cart_id = %cart_id, "Stored cart no longer exists");
                self.forget().await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The active cart, creating one if none exists or the stored one has
    /// disappeared.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be retrieved or created.
    #[instrument(skip(self))]
    pub async fn ensure_cart(&self) -> Result<Cart> {
        if let Some(cart) = self.current().await? {
            return Ok(cart);
        }

        let cart = self
            .inner
            .api
            .create_cart(CreateCartInput::default())
            .await?;
        tracing::info!(cart_id = %cart.id, "Created cart");
        add_breadcrumb("cart", "Created cart", Some(&[("cart_id", cart.id.as_str())]));

        self.inner.stores.cart_id.replace(Some(cart.id.clone()));
        self.inner.cache.set(QueryKey::Cart, cart.clone()).await;
        Ok(cart)
    }

    /// Add a line, creating the cart first if needed. Adding a variant
    /// already in the cart increases that line's quantity.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero quantity or if the backend rejects the
    /// line; the cached cart is rolled back.
    #[instrument(skip(self, draft), fields(variant_id = %draft.variant_id, quantity = draft.quantity))]
    pub async fn add_item(&self, draft: LineItemDraft) -> Result<Cart> {
        self.inner
            .action
            .track(async {
                if draft.quantity == 0 {
                    return Err(StorefrontError::InvalidInput(
                        "Quantity must be at least 1.".to_string(),
                    ));
                }
                let cart = self.ensure_cart().await?;

                let api = &self.inner.api;
                let cart = mutate_optimistically(
                    &self.inner.cache,
                    QueryKey::Cart,
                    |current: Option<Cart>| {
                        let mut cart = current?;
                        if let Some(line) = cart
                            .items
                            .iter_mut()
                            .find(|line| line.variant_id == draft.variant_id)
                        {
                            line.quantity = line.quantity.saturating_add(draft.quantity);
                        } else {
                            cart.items.push(draft.placeholder());
                        }
                        Some(cart)
                    },
                    api.add_line_item(&cart.id, &draft.variant_id, draft.quantity),
                )
                .await?;

                add_breadcrumb(
                    "cart",
                    "Added line item",
                    Some(&[("variant_id", draft.variant_id.as_str())]),
                );
                Ok(cart)
            })
            .await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the backend rejects the
    /// change; the cached cart is rolled back.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_item(&self, line_id: &LineItemId, quantity: u32) -> Result<Cart> {
        if quantity == 0 {
            return self.remove_item(line_id).await;
        }

        self.inner
            .action
            .track(async {
                let cart_id = self.require_cart_id()?;
                let api = &self.inner.api;
                let cart = mutate_optimistically(
                    &self.inner.cache,
                    QueryKey::Cart,
                    |current: Option<Cart>| {
                        let mut cart = current?;
                        let line = cart.items.iter_mut().find(|line| line.id == *line_id)?;
                        line.quantity = quantity;
                        Some(cart)
                    },
                    api.update_line_item(&cart_id, line_id, quantity),
                )
                .await?;
                Ok(cart)
            })
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the backend rejects the
    /// removal; the cached cart is rolled back.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_item(&self, line_id: &LineItemId) -> Result<Cart> {
        self.inner
            .action
            .track(async {
                let cart_id = self.require_cart_id()?;
                let api = &self.inner.api;
                let cart = mutate_optimistically(
                    &self.inner.cache,
                    QueryKey::Cart,
                    |current: Option<Cart>| {
                        let mut cart = current?;
                        cart.items.retain(|line| line.id != *line_id);
                        Some(cart)
                    },
                    api.delete_line_item(&cart_id, line_id),
                )
                .await?;

                add_breadcrumb(
                    "cart",
                    "Removed line item",
                    Some(&[("line_id", line_id.as_str())]),
                );
                Ok(cart)
            })
            .await
    }

    /// Set the contact email and addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the backend rejects the
    /// details.
    #[instrument(skip_all)]
    pub async fn update_details(
        &self,
        email: Option<Email>,
        shipping_address: Option<Address>,
        billing_address: Option<Address>,
    ) -> Result<Cart> {
        self.update(UpdateCartInput {
            email,
            shipping_address,
            billing_address,
            promo_codes: None,
        })
        .await
    }

    /// Replace the cart's promotion codes.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or a code is rejected.
    #[instrument(skip(self))]
    pub async fn apply_promo_codes(&self, codes: Vec<String>) -> Result<Cart> {
        let codes = codes
            .into_iter()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();
        self.update(UpdateCartInput {
            promo_codes: Some(codes),
            ..UpdateCartInput::default()
        })
        .await
    }

    /// Shipping options available for the active cart.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the backend cannot be
    /// reached.
    #[instrument(skip(self))]
    pub async fn shipping_options(&self) -> Result<Vec<ShippingOption>> {
        let cart_id = self.require_cart_id()?;
        Ok(self.inner.api.list_shipping_options(&cart_id).await?)
    }

    /// Select a shipping option for the active cart.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the option is rejected.
    #[instrument(skip(self), fields(option_id = %option_id))]
    pub async fn select_shipping(&self, option_id: &ShippingOptionId) -> Result<Cart> {
        self.inner
            .action
            .track(async {
                let cart_id = self.require_cart_id()?;
                let cart = self
                    .inner
                    .api
                    .add_shipping_method(&cart_id, option_id)
                    .await?;
                self.inner.cache.set(QueryKey::Cart, cart.clone()).await;
                Ok(cart)
            })
            .await
    }

    /// Total quantity in the last known cart.
    pub async fn item_count(&self) -> u32 {
        self.inner
            .cache
            .get::<Cart>(QueryKey::Cart)
            .await
            .map_or(0, |cart| cart.item_count())
    }

    /// Drop the stored cart ID and cached cart, e.g. after the cart has
    /// become an order.
    pub async fn forget(&self) {
        self.inner.stores.cart_id.reset();
        self.inner.cache.remove(QueryKey::Cart).await;
    }

    /// Cache a cart returned by another operation (checkout completion).
    pub(crate) async fn adopt(&self, cart: Cart) {
        self.inner.cache.set(QueryKey::Cart, cart).await;
    }

    async fn update(&self, input: UpdateCartInput) -> Result<Cart> {
        self.inner
            .action
            .track(async {
                let cart_id = self.require_cart_id()?;
                let cart = self.inner.api.update_cart(&cart_id, input).await?;
                self.inner.cache.set(QueryKey::Cart, cart.clone()).await;
                Ok(cart)
            })
            .await
    }

    async fn fetch(&self, cart_id: &CartId) -> std::result::Result<Cart, BackendError> {
        let api = &self.inner.api;
        self.inner
            .cache
            .fetch(QueryKey::Cart, || api.retrieve_cart(cart_id))
            .await
    }

    fn require_cart_id(&self) -> Result<CartId> {
        self.cart_id().ok_or_else(|| CheckoutError::NoCart.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{FakeCommerce, Harness};

    fn draft(variant: &str, quantity: u32) -> LineItemDraft {
        LineItemDraft {
            variant_id: VariantId::new(variant),
            product_id: None,
            quantity,
            title: format!("Variant {variant}"),
            thumbnail: None,
            unit_price: Decimal::from(450),
        }
    }

    #[tokio::test]
    async fn test_no_stored_id_means_no_cart() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        assert!(carts.current().await.unwrap().is_none());
        assert_eq!(harness.api.calls("retrieve_cart"), 0);
    }

    #[tokio::test]
    async fn test_ensure_cart_creates_and_persists_id() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        let cart = carts.ensure_cart().await.unwrap();
        assert_eq!(carts.cart_id(), Some(cart.id.clone()));

        // Second call reuses the cached cart
        let again = carts.ensure_cart().await.unwrap();
        assert_eq!(again.id, cart.id);
        assert_eq!(harness.api.calls("create_cart"), 1);
    }

    #[tokio::test]
    async fn test_stale_cart_id_is_replaced() {
        let harness = Harness::new();
        harness
            .stores
            .cart_id
            .replace(Some(CartId::new("cart_expired")));
        let carts = harness.cart_service();

        let cart = carts.ensure_cart().await.unwrap();
        assert_ne!(cart.id.as_str(), "cart_expired");
        assert_eq!(carts.cart_id(), Some(cart.id));
    }

    #[tokio::test]
    async fn test_stale_cart_id_reads_as_no_cart() {
        let harness = Harness::new();
        harness
            .stores
            .cart_id
            .replace(Some(CartId::new("cart_expired")));
        let carts = harness.cart_service();

        assert!(carts.current().await.unwrap().is_none());
        assert_eq!(carts.cart_id(), None);
    }

    #[tokio::test]
    async fn test_add_item_merges_same_variant() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        carts.add_item(draft("variant_bag", 1)).await.unwrap();
        let cart = carts.add_item(draft("variant_bag", 2)).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(carts.item_count().await, 3);
    }

    #[tokio::test]
    async fn test_add_item_near_quantity_limit_saturates() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        carts.add_item(draft("variant_bag", u32::MAX - 1)).await.unwrap();
        let cart = carts.add_item(draft("variant_bag", 5)).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, u32::MAX);
        assert_eq!(carts.item_count().await, u32::MAX);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_rejected() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        let err = carts.add_item(draft("variant_bag", 0)).await.unwrap_err();
        assert!(matches!(err, StorefrontError::InvalidInput(_)));
        assert_eq!(harness.api.calls("create_cart"), 0);
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back_cart() {
        let harness = Harness::new();
        let carts = harness.cart_service();
        let cart = carts.add_item(draft("variant_bag", 1)).await.unwrap();
        let line_id = cart.items[0].id.clone();
        let before = harness.cache.get::<Cart>(QueryKey::Cart).await.unwrap();

        harness.api.fail_next(
            "update_line_item",
            BackendError::Api {
                status: 400,
                message: "Only 2 left in stock".to_string(),
            },
        );
        let err = carts.update_item(&line_id, 9).await.unwrap_err();

        assert_eq!(err.user_message(), "Only 2 left in stock");
        let after = harness.cache.get::<Cart>(QueryKey::Cart).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(
            carts.status().error.as_deref(),
            Some("Only 2 left in stock")
        );
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let harness = Harness::new();
        let carts = harness.cart_service();
        let cart = carts.add_item(draft("variant_bag", 2)).await.unwrap();

        let cart = carts.update_item(&cart.items[0].id, 0).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(harness.api.calls("delete_line_item"), 1);
        assert_eq!(harness.api.calls("update_line_item"), 0);
    }

    #[tokio::test]
    async fn test_update_without_cart_fails() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        let err = carts
            .update_item(&LineItemId::new("item_1"), 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::Checkout(CheckoutError::NoCart)
        ));
    }

    #[tokio::test]
    async fn test_server_totals_replace_optimistic_copy() {
        let harness = Harness::new();
        let carts = harness.cart_service();

        let cart = carts.add_item(draft("variant_bag", 2)).await.unwrap();
        // FakeCommerce prices every variant at 100
        assert_eq!(cart.item_subtotal, Decimal::from(200));
        assert_eq!(cart.items[0].unit_price, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_promo_codes_are_trimmed() {
        let harness = Harness::new();
        let carts = harness.cart_service();
        carts.ensure_cart().await.unwrap();

        carts
            .apply_promo_codes(vec![" WELCOME10 ".to_string(), String::new()])
            .await
            .unwrap();
        assert_eq!(
            harness.api.last_promo_codes(),
            Some(vec!["WELCOME10".to_string()])
        );
    }

    #[tokio::test]
    async fn test_select_shipping_updates_cache() {
        let harness = Harness::new();
        let carts = harness.cart_service();
        carts.ensure_cart().await.unwrap();

        let options = carts.shipping_options().await.unwrap();
        let cart = carts.select_shipping(&options[0].id).await.unwrap();

        assert_eq!(cart.shipping_methods.len(), 1);
        let cached = harness.cache.get::<Cart>(QueryKey::Cart).await.unwrap();
        assert_eq!(cached.shipping_methods.len(), 1);
    }

    #[tokio::test]
    async fn test_forget_clears_id_and_cache() {
        let harness = Harness::new();
        let carts = harness.cart_service();
        carts.add_item(draft("variant_bag", 1)).await.unwrap();

        carts.forget().await;
        assert_eq!(carts.cart_id(), None);
        assert_eq!(carts.item_count().await, 0);
    }

    #[test]
    fn test_fake_is_a_commerce_api() {
        fn assert_api<T: CommerceApi>() {}
        assert_api::<FakeCommerce>();
    }
}
