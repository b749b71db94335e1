//! Domain types for the commerce backend REST API.
//!
//! Amounts arrive as JSON numbers in major units and are held as
//! [`Decimal`]; currency codes arrive lower-case (`"usd"`).

use atelier_core::{
    CartId, CategoryId, CollectionId, CurrencyCode, CustomerId, Email, LineItemId, OrderId,
    PaymentCollectionId, PaymentSessionId, Price, ProductId, RegionId, ShippingOptionId, UserId,
    VariantId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Cart Types
// =============================================================================

/// Postal address attached to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-2, lower-case.
    pub country_code: Option<String>,
    pub phone: Option<String>,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line item ID.
    pub id: LineItemId,
    /// Purchased variant.
    pub variant_id: VariantId,
    /// Parent product.
    pub product_id: Option<ProductId>,
    /// Display title.
    pub title: String,
    /// Thumbnail URL.
    pub thumbnail: Option<String>,
    /// Quantity.
    pub quantity: u32,
    /// Unit price in major units.
    pub unit_price: Decimal,
}

/// Shipping method selected on a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub shipping_option_id: Option<ShippingOptionId>,
    pub name: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// A shipping option offered for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: ShippingOptionId,
    pub name: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// Payment session created for a cart's payment collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: PaymentSessionId,
    pub provider_id: String,
    pub status: Option<String>,
    /// Provider-specific payload (carries the processor client secret).
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PaymentSession {
    /// Client secret handed to the payment processor SDK.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.data.get("client_secret").and_then(|v| v.as_str())
    }
}

/// Payment collection owning a cart's payment sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCollection {
    pub id: PaymentCollectionId,
    #[serde(default)]
    pub payment_sessions: Vec<PaymentSession>,
}

/// A shopping cart. Server-owned; totals are authoritative only as
/// returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Region the cart is priced in.
    pub region_id: Option<RegionId>,
    /// Lower-case ISO currency code.
    pub currency_code: String,
    /// Contact email.
    pub email: Option<String>,
    /// Cart lines.
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Selected shipping methods.
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub item_subtotal: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub total: Decimal,
    pub payment_collection: Option<PaymentCollection>,
}

impl Cart {
    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count: u32, item| count.saturating_add(item.quantity))
    }

    /// Parsed currency, if supported.
    #[must_use]
    pub fn currency(&self) -> Option<CurrencyCode> {
        self.currency_code.parse().ok()
    }

    /// Total as a [`Price`], if the currency is supported.
    #[must_use]
    pub fn total_price(&self) -> Option<Price> {
        self.currency().map(|code| Price::new(self.total, code))
    }

    /// Find the line holding a variant.
    #[must_use]
    pub fn line_for_variant(&self, variant_id: &VariantId) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.variant_id == variant_id)
    }
}

/// A line item to add to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Input for creating a cart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateCartInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<NewLineItem>,
}

/// Input for updating cart contact and address details.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCartInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_codes: Option<Vec<String>>,
}

// =============================================================================
// Order Types
// =============================================================================

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub display_id: Option<u64>,
    pub email: Option<String>,
    pub currency_code: String,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

/// Error attached to a failed cart completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionError {
    pub message: String,
}

/// Result of `POST /store/carts/{id}/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartCompletion {
    /// The cart became an order.
    Order { order: Order },
    /// Completion failed; the cart is returned with the reason.
    Cart {
        cart: Box<Cart>,
        error: Option<CompletionError>,
    },
}

// =============================================================================
// Catalog Types
// =============================================================================

/// Calculated price of a variant in the requested region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedPrice {
    pub calculated_amount: Decimal,
    pub currency_code: String,
}

/// A purchasable product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub title: String,
    pub sku: Option<String>,
    pub calculated_price: Option<CalculatedPrice>,
}

impl ProductVariant {
    /// Price as a [`Price`], if calculated and in a supported currency.
    #[must_use]
    pub fn price(&self) -> Option<Price> {
        let calculated = self.calculated_price.as_ref()?;
        let currency = calculated.currency_code.parse().ok()?;
        Some(Price::new(calculated.calculated_amount, currency))
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub handle: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub collection_id: Option<CollectionId>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

/// A product collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
    pub handle: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub handle: String,
    pub parent_category_id: Option<CategoryId>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Offset pagination parameters for listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
    pub handle: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            handle: None,
        }
    }
}

impl ListQuery {
    /// Query for the page following one that returned `fetched` items.
    /// Servers may cap the page below `limit`, so the offset advances by
    /// what was actually returned.
    #[must_use]
    pub fn next_page(&self, fetched: usize) -> Self {
        Self {
            offset: self
                .offset
                .saturating_add(u32::try_from(fetched).unwrap_or(u32::MAX)),
            ..self.clone()
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u32,
    pub offset: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Whether more items exist after this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        let fetched = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        !self.items.is_empty() && self.offset.saturating_add(fetched) < self.count
    }
}

// =============================================================================
// Auth Types
// =============================================================================

/// Authenticated account identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Commerce customer record linked to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// Response to `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: AuthUser,
    pub customer: Option<Customer>,
}

/// Response to login, register and OAuth token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
    pub customer: Option<Customer>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .field("customer", &self.customer)
            .finish()
    }
}

/// Email/password credentials.
#[derive(Clone, Serialize)]
pub struct LoginInput {
    pub email: Email,
    pub password: String,
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Account registration payload.
#[derive(Clone, Serialize)]
pub struct RegisterInput {
    pub email: Email,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for RegisterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterInput")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

// =============================================================================
// Favorites Types
// =============================================================================

/// Product summary embedded in a favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteProduct {
    pub title: String,
    pub handle: String,
    pub thumbnail: Option<String>,
    pub price: Option<Decimal>,
    pub currency_code: Option<String>,
}

/// A server-side wishlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub product_id: ProductId,
    #[serde(default)]
    pub product: Option<FavoriteProduct>,
}
