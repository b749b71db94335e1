//! Commerce backend REST API client.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the seam between services and the network; services
//!   hold an `Arc<dyn CommerceApi>` so tests can substitute an in-memory fake
//! - [`BackendClient`] is the `reqwest` implementation
//! - The backend is source of truth - the client never computes totals
//! - Catalog reads are cached in memory via `moka` (5 minute TTL)
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_storefront::backend::{BackendClient, CommerceApi, CreateCartInput};
//!
//! let client = BackendClient::new(&config.backend)?;
//!
//! let cart = client.create_cart(CreateCartInput::default()).await?;
//! let cart = client.add_line_item(&cart.id, &variant_id, 1).await?;
//! ```

mod cache;
mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use atelier_core::{CartId, LineItemId, PaymentCollectionId, ProductId, ShippingOptionId, VariantId};

pub use client::BackendClient;
pub use types::*;

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection failure, timeout or similar transport problem.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request carried no valid session (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Option<Duration>),

    /// Any other non-success status, with the backend's message.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built (bad base URL or path).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// Whether the query layer should retry the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::NotFound(_) => Some(404),
            Self::RateLimited(_) => Some(429),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Operations the storefront needs from the commerce backend.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Install or clear the bearer token sent with authenticated requests.
    fn set_access_token(&self, token: Option<String>);

    // Carts
    async fn retrieve_cart(&self, cart_id: &CartId) -> Result<Cart, BackendError>;
    async fn create_cart(&self, input: CreateCartInput) -> Result<Cart, BackendError>;
    async fn update_cart(&self, cart_id: &CartId, input: UpdateCartInput)
    -> Result<Cart, BackendError>;
    async fn add_line_item(
        &self,
        cart_id: &CartId,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<Cart, BackendError>;
    async fn update_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        quantity: u32,
    ) -> Result<Cart, BackendError>;
    async fn delete_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, BackendError>;
    async fn list_shipping_options(
        &self,
        cart_id: &CartId,
    ) -> Result<Vec<ShippingOption>, BackendError>;
    async fn add_shipping_method(
        &self,
        cart_id: &CartId,
        option_id: &ShippingOptionId,
    ) -> Result<Cart, BackendError>;
    async fn create_payment_collection(
        &self,
        cart_id: &CartId,
    ) -> Result<PaymentCollection, BackendError>;
    async fn initiate_payment_session(
        &self,
        collection_id: &PaymentCollectionId,
        provider_id: &str,
    ) -> Result<PaymentCollection, BackendError>;
    async fn complete_cart(&self, cart_id: &CartId) -> Result<CartCompletion, BackendError>;

    // Catalog
    async fn list_products(&self, query: &ListQuery) -> Result<Page<Product>, BackendError>;
    async fn get_product_by_handle(&self, handle: &str) -> Result<Product, BackendError>;
    async fn list_collections(&self, query: &ListQuery) -> Result<Page<Collection>, BackendError>;
    async fn list_categories(&self, query: &ListQuery) -> Result<Page<Category>, BackendError>;

    // Auth
    async fn login(&self, input: &LoginInput) -> Result<AuthResponse, BackendError>;
    async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, BackendError>;
    async fn exchange_google_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthResponse, BackendError>;
    async fn me(&self) -> Result<Identity, BackendError>;
    async fn logout(&self) -> Result<(), BackendError>;

    // Favorites
    async fn list_favorites(&self) -> Result<Vec<Favorite>, BackendError>;
    async fn add_favorite(&self, product_id: &ProductId) -> Result<Vec<Favorite>, BackendError>;
    async fn remove_favorite(&self, product_id: &ProductId)
    -> Result<Vec<Favorite>, BackendError>;
    async fn sync_favorites(&self, product_ids: &[ProductId])
    -> Result<Vec<Favorite>, BackendError>;
}
