//! `reqwest` implementation of [`CommerceApi`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use atelier_core::{CartId, LineItemId, PaymentCollectionId, ProductId, ShippingOptionId, VariantId};

use super::cache::{CacheKey, CacheValue};
use super::types::{
    AuthResponse, Cart, CartCompletion, Category, Collection, CreateCartInput, Favorite, Identity,
    ListQuery, LoginInput, Page, PaymentCollection, Product, RegisterInput, ShippingOption,
    UpdateCartInput,
};
use super::{BackendError, CommerceApi};
use crate::config::BackendConfig;

/// User agent for backend requests.
const USER_AGENT_VALUE: &str = concat!("atelier-storefront/", env!("CARGO_PKG_VERSION"));

/// Header carrying the backend publishable key.
const PUBLISHABLE_KEY_HEADER: &str = "x-publishable-api-key";

/// Header carrying a per-request correlation ID.
const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Response envelopes
// =============================================================================

#[derive(serde::Deserialize)]
struct CartEnvelope {
    cart: Cart,
}

#[derive(serde::Deserialize)]
struct DeletedLineEnvelope {
    parent: Cart,
}

#[derive(serde::Deserialize)]
struct ShippingOptionsEnvelope {
    shipping_options: Vec<ShippingOption>,
}

#[derive(serde::Deserialize)]
struct PaymentCollectionEnvelope {
    payment_collection: PaymentCollection,
}

#[derive(serde::Deserialize)]
struct ProductsEnvelope {
    products: Vec<Product>,
    count: u32,
    offset: u32,
    limit: u32,
}

#[derive(serde::Deserialize)]
struct CollectionsEnvelope {
    collections: Vec<Collection>,
    count: u32,
    offset: u32,
    limit: u32,
}

#[derive(serde::Deserialize)]
struct CategoriesEnvelope {
    categories: Vec<Category>,
    count: u32,
    offset: u32,
    limit: u32,
}

#[derive(serde::Deserialize)]
struct FavoritesEnvelope {
    favorites: Vec<Favorite>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// =============================================================================
// BackendClient
// =============================================================================

/// Client for the commerce backend REST API.
///
/// Cheaply cloneable. Catalog reads are cached for 5 minutes; cart,
/// auth and favorites calls always hit the network (the query cache
/// above this layer decides freshness for those).
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: String,
    region_id: Option<String>,
    /// Bearer token for the signed-in customer
    token: RwLock<Option<String>>,
    cache: Cache<CacheKey, CacheValue>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the publishable key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let key = HeaderValue::from_str(config.publishable_key.expose_secret())
            .map_err(|e| BackendError::InvalidRequest(format!("publishable key: {e}")))?;
        default_headers.insert(PUBLISHABLE_KEY_HEADER, key);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                region_id: config.region_id.clone(),
                token: RwLock::new(None),
                cache,
            }),
        })
    }

    /// Build the request URL. Each segment is percent-encoded, so an ID
    /// containing `/`, `?` or `#` stays inside its own segment.
    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, BackendError> {
        let base = &self.inner.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| BackendError::InvalidRequest(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidRequest(format!("{base}: not a base URL")))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a request and decode the JSON response.
    async fn send<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let text = self.send_raw(method, segments, query, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                path = %segments.join("/"),
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::from(e)
        })
    }

    /// Send a request and return the raw body of a successful response.
    async fn send_raw<B>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<String, BackendError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.url(segments, query)?;
        let path = url.path().to_string();
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(method = %method, url = %url, request_id = %request_id, "backend request");

        let mut request = self
            .inner
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, &request_id);

        let token = self
            .inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response.text().await?),
            401 => Err(BackendError::Unauthorized),
            404 => Err(BackendError::NotFound(path.clone())),
            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(BackendError::RateLimited(retry_after))
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&text)
                    .ok()
                    .and_then(|body| body.message)
                    .unwrap_or_else(|| text.chars().take(200).collect());
                tracing::warn!(
                    status = code,
                    path = %path,
                    request_id = %request_id,
                    message = %message,
                    "Backend returned non-success status"
                );
                Err(BackendError::Api {
                    status: code,
                    message,
                })
            }
        }
    }
}

fn page_query(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("limit", query.limit.to_string()),
        ("offset", query.offset.to_string()),
    ];
    if let Some(handle) = &query.handle {
        pairs.push(("handle", handle.clone()));
    }
    pairs
}

#[async_trait]
impl CommerceApi for BackendClient {
    fn set_access_token(&self, token: Option<String>) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn retrieve_cart(&self, cart_id: &CartId) -> Result<Cart, BackendError> {
        let envelope: CartEnvelope = self
            .send::<(), _>(Method::GET, &["store", "carts", cart_id.as_str()], &[], None)
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self, input))]
    async fn create_cart(&self, mut input: CreateCartInput) -> Result<Cart, BackendError> {
        if input.region_id.is_none() {
            input.region_id = self.inner.region_id.clone().map(Into::into);
        }
        let envelope: CartEnvelope = self
            .send(Method::POST, &["store", "carts"], &[], Some(&input))
            .await?;
        debug!(cart_id = %envelope.cart.id, "Created cart");
        Ok(envelope.cart)
    }

    #[instrument(skip(self, input), fields(cart_id = %cart_id))]
    async fn update_cart(
        &self,
        cart_id: &CartId,
        input: UpdateCartInput,
    ) -> Result<Cart, BackendError> {
        let envelope: CartEnvelope = self
            .send(
                Method::POST,
                &["store", "carts", cart_id.as_str()],
                &[],
                Some(&input),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, variant_id = %variant_id))]
    async fn add_line_item(
        &self,
        cart_id: &CartId,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<Cart, BackendError> {
        let body = json!({ "variant_id": variant_id, "quantity": quantity });
        let envelope: CartEnvelope = self
            .send(
                Method::POST,
                &["store", "carts", cart_id.as_str(), "line-items"],
                &[],
                Some(&body),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    async fn update_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        quantity: u32,
    ) -> Result<Cart, BackendError> {
        let body = json!({ "quantity": quantity });
        let envelope: CartEnvelope = self
            .send(
                Method::POST,
                &["store", "carts", cart_id.as_str(), "line-items", line_id.as_str()],
                &[],
                Some(&body),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    async fn delete_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, BackendError> {
        let envelope: DeletedLineEnvelope = self
            .send::<(), _>(
                Method::DELETE,
                &["store", "carts", cart_id.as_str(), "line-items", line_id.as_str()],
                &[],
                None,
            )
            .await?;
        Ok(envelope.parent)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn list_shipping_options(
        &self,
        cart_id: &CartId,
    ) -> Result<Vec<ShippingOption>, BackendError> {
        let envelope: ShippingOptionsEnvelope = self
            .send::<(), _>(
                Method::GET,
                &["store", "shipping-options"],
                &[("cart_id", cart_id.to_string())],
                None,
            )
            .await?;
        Ok(envelope.shipping_options)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, option_id = %option_id))]
    async fn add_shipping_method(
        &self,
        cart_id: &CartId,
        option_id: &ShippingOptionId,
    ) -> Result<Cart, BackendError> {
        let body = json!({ "option_id": option_id });
        let envelope: CartEnvelope = self
            .send(
                Method::POST,
                &["store", "carts", cart_id.as_str(), "shipping-methods"],
                &[],
                Some(&body),
            )
            .await?;
        Ok(envelope.cart)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn create_payment_collection(
        &self,
        cart_id: &CartId,
    ) -> Result<PaymentCollection, BackendError> {
        let body = json!({ "cart_id": cart_id });
        let envelope: PaymentCollectionEnvelope = self
            .send(Method::POST, &["store", "payment-collections"], &[], Some(&body))
            .await?;
        Ok(envelope.payment_collection)
    }

    #[instrument(skip(self), fields(collection_id = %collection_id))]
    async fn initiate_payment_session(
        &self,
        collection_id: &PaymentCollectionId,
        provider_id: &str,
    ) -> Result<PaymentCollection, BackendError> {
        let body = json!({ "provider_id": provider_id });
        let envelope: PaymentCollectionEnvelope = self
            .send(
                Method::POST,
                &["store", "payment-collections", collection_id.as_str(), "payment-sessions"],
                &[],
                Some(&body),
            )
            .await?;
        Ok(envelope.payment_collection)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn complete_cart(&self, cart_id: &CartId) -> Result<CartCompletion, BackendError> {
        self.send::<(), _>(
            Method::POST,
            &["store", "carts", cart_id.as_str(), "complete"],
            &[],
            None,
        )
        .await
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_products(&self, query: &ListQuery) -> Result<Page<Product>, BackendError> {
        let cache_key = CacheKey::Products(query.clone());
        if let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let envelope: ProductsEnvelope = self
            .send::<(), _>(Method::GET, &["store", "products"], &page_query(query), None)
            .await?;
        let page = Page {
            items: envelope.products,
            count: envelope.count,
            offset: envelope.offset,
            limit: envelope.limit,
        };

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(page.clone()))
            .await;
        Ok(page)
    }

    #[instrument(skip(self), fields(handle = %handle))]
    async fn get_product_by_handle(&self, handle: &str) -> Result<Product, BackendError> {
        let cache_key = CacheKey::Product(handle.to_string());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let query = ListQuery {
            limit: 1,
            offset: 0,
            handle: Some(handle.to_string()),
        };
        let envelope: ProductsEnvelope = self
            .send::<(), _>(Method::GET, &["store", "products"], &page_query(&query), None)
            .await?;
        let product = envelope
            .products
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("product {handle}")))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn list_collections(&self, query: &ListQuery) -> Result<Page<Collection>, BackendError> {
        let cache_key = CacheKey::Collections(query.clone());
        if let Some(CacheValue::Collections(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for collections");
            return Ok(page);
        }

        let envelope: CollectionsEnvelope = self
            .send::<(), _>(Method::GET, &["store", "collections"], &page_query(query), None)
            .await?;
        let page = Page {
            items: envelope.collections,
            count: envelope.count,
            offset: envelope.offset,
            limit: envelope.limit,
        };

        self.inner
            .cache
            .insert(cache_key, CacheValue::Collections(page.clone()))
            .await;
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn list_categories(&self, query: &ListQuery) -> Result<Page<Category>, BackendError> {
        let cache_key = CacheKey::Categories(query.clone());
        if let Some(CacheValue::Categories(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for categories");
            return Ok(page);
        }

        let envelope: CategoriesEnvelope = self
            .send::<(), _>(Method::GET, &["store", "categories"], &page_query(query), None)
            .await?;
        let page = Page {
            items: envelope.categories,
            count: envelope.count,
            offset: envelope.offset,
            limit: envelope.limit,
        };

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(page.clone()))
            .await;
        Ok(page)
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    #[instrument(skip(self, input), fields(email = %input.email))]
    async fn login(&self, input: &LoginInput) -> Result<AuthResponse, BackendError> {
        self.send(Method::POST, &["auth", "login"], &[], Some(input)).await
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, BackendError> {
        self.send(Method::POST, &["auth", "register"], &[], Some(input))
            .await
    }

    #[instrument(skip(self, code))]
    async fn exchange_google_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthResponse, BackendError> {
        let body = json!({ "code": code, "redirect_uri": redirect_uri });
        self.send(Method::POST, &["auth", "google", "token"], &[], Some(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn me(&self) -> Result<Identity, BackendError> {
        self.send::<(), _>(Method::GET, &["auth", "me"], &[], None).await
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), BackendError> {
        self.send_raw::<()>(Method::POST, &["auth", "logout"], &[], None)
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Favorites Methods
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_favorites(&self) -> Result<Vec<Favorite>, BackendError> {
        let envelope: FavoritesEnvelope = self
            .send::<(), _>(Method::GET, &["store", "favorites"], &[], None)
            .await?;
        Ok(envelope.favorites)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_favorite(&self, product_id: &ProductId) -> Result<Vec<Favorite>, BackendError> {
        let body = json!({ "product_id": product_id });
        let envelope: FavoritesEnvelope = self
            .send(Method::POST, &["store", "favorites"], &[], Some(&body))
            .await?;
        Ok(envelope.favorites)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_favorite(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<Favorite>, BackendError> {
        let envelope: FavoritesEnvelope = self
            .send::<(), _>(
                Method::DELETE,
                &["store", "favorites", product_id.as_str()],
                &[],
                None,
            )
            .await?;
        Ok(envelope.favorites)
    }

    #[instrument(skip(self, product_ids), fields(count = product_ids.len()))]
    async fn sync_favorites(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<Favorite>, BackendError> {
        let body = json!({ "product_ids": product_ids });
        let envelope: FavoritesEnvelope = self
            .send(Method::POST, &["store", "favorites", "sync"], &[], Some(&body))
            .await?;
        Ok(envelope.favorites)
    }
}
