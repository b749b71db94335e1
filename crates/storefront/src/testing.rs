//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Notify;

use atelier_core::{
    CartId, CategoryId, CollectionId, CustomerId, LineItemId, OrderId, PaymentCollectionId,
    PaymentSessionId, ProductId, ShippingOptionId, UserId, VariantId,
};

use crate::backend::{
    AuthResponse, AuthUser, BackendError, Cart, CartCompletion, Category, Collection,
    CommerceApi, CompletionError, CreateCartInput, Customer, Favorite, Identity, LineItem,
    ListQuery, LoginInput, Order, Page, PaymentCollection, PaymentSession, Product,
    RegisterInput, ShippingMethod, ShippingOption, UpdateCartInput,
};
use crate::config::QueryConfig;
use crate::payment::{ConfirmOptions, PaymentError, PaymentIntent, PaymentProcessor};
use crate::query::QueryCache;
use crate::services::{AuthService, CartService, CheckoutService, WishlistService};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::stores::ClientStores;

/// Price the fake backend charges for every variant.
pub const FAKE_UNIT_PRICE: u32 = 100;

/// A cart with the given `(line_id, variant_id, quantity)` lines.
pub fn cart(id: &str, lines: &[(&str, &str, u32)]) -> Cart {
    let mut cart = Cart {
        id: CartId::new(id),
        region_id: None,
        currency_code: "eur".to_string(),
        email: None,
        items: lines
            .iter()
            .map(|(line_id, variant_id, quantity)| LineItem {
                id: LineItemId::new(*line_id),
                variant_id: VariantId::new(*variant_id),
                product_id: None,
                title: format!("Variant {variant_id}"),
                thumbnail: None,
                quantity: *quantity,
                unit_price: Decimal::from(FAKE_UNIT_PRICE),
            })
            .collect(),
        shipping_methods: Vec::new(),
        shipping_address: None,
        billing_address: None,
        item_subtotal: Decimal::ZERO,
        shipping_total: Decimal::ZERO,
        discount_total: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        total: Decimal::ZERO,
        payment_collection: None,
    };
    recompute_totals(&mut cart);
    cart
}

fn recompute_totals(cart: &mut Cart) {
    cart.item_subtotal = cart
        .items
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum();
    cart.shipping_total = cart.shipping_methods.iter().map(|m| m.amount).sum();
    cart.total = cart.item_subtotal + cart.shipping_total - cart.discount_total;
}

fn product(handle: &str) -> Product {
    Product {
        id: ProductId::new(format!("prod_{handle}")),
        title: handle.replace('-', " "),
        handle: handle.to_string(),
        subtitle: None,
        description: None,
        thumbnail: None,
        collection_id: None,
        updated_at: None,
        variants: Vec::new(),
    }
}

fn page<T: Clone>(items: &[T], query: &ListQuery, cap: Option<u32>) -> Page<T> {
    let offset = query.offset as usize;
    let limit = cap.map_or(query.limit, |cap| cap.min(query.limit)) as usize;
    Page {
        items: items.iter().skip(offset).take(limit).cloned().collect(),
        count: u32::try_from(items.len()).unwrap(),
        offset: query.offset,
        limit: query.limit,
    }
}

#[derive(Default)]
struct FakeState {
    carts: HashMap<CartId, Cart>,
    favorites: Vec<ProductId>,
    token: Option<String>,
    user: Option<AuthUser>,
    failures: HashMap<&'static str, VecDeque<BackendError>>,
    calls: HashMap<&'static str, u32>,
    completion_failure: Option<String>,
    last_promo_codes: Option<Vec<String>>,
    synced_ids: Vec<ProductId>,
    products: Vec<Product>,
    collections: Vec<Collection>,
    categories: Vec<Category>,
    page_cap: Option<u32>,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:02}", self.next_id)
    }

    fn cart_mut(&mut self, cart_id: &CartId) -> Result<&mut Cart, BackendError> {
        self.carts
            .get_mut(cart_id)
            .ok_or_else(|| BackendError::NotFound(format!("/store/carts/{cart_id}")))
    }

    fn favorites(&self) -> Vec<Favorite> {
        self.favorites
            .iter()
            .map(|id| Favorite {
                product_id: id.clone(),
                product: None,
            })
            .collect()
    }

    fn auth_response(&mut self, email: &str, first_name: &str, last_name: &str) -> AuthResponse {
        let local = email.split('@').next().unwrap_or(email);
        let user = AuthUser {
            id: UserId::new(format!("user_{local}")),
            email: email.to_string(),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
        };
        let token = format!("tok_{local}");
        self.user = Some(user.clone());
        self.token = Some(token.clone());
        AuthResponse {
            token,
            customer: Some(Customer {
                id: CustomerId::new(format!("cus_{local}")),
                email: email.to_string(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                phone: None,
            }),
            user,
        }
    }
}

/// In-memory commerce backend with scripted failures.
#[derive(Default)]
pub struct FakeCommerce {
    state: Mutex<FakeState>,
}

impl FakeCommerce {
    fn enter(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, FakeState>, BackendError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        if let Some(err) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }

    /// Number of times `op` was called, including failed calls.
    pub fn calls(&self, op: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Fail the next call to `op` with `err`. Queued failures are consumed
    /// in order.
    pub fn fail_next(&self, op: &'static str, err: BackendError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Make cart completion return the cart with `message`.
    pub fn fail_completion(&self, message: &str) {
        self.state.lock().unwrap().completion_failure = Some(message.to_string());
    }

    pub fn set_favorites(&self, ids: &[&str]) {
        self.state.lock().unwrap().favorites = ids.iter().map(|id| ProductId::new(*id)).collect();
    }

    /// IDs sent with the most recent favorites sync.
    pub fn synced_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .synced_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    pub fn last_promo_codes(&self) -> Option<Vec<String>> {
        self.state.lock().unwrap().last_promo_codes.clone()
    }

    /// Bearer token currently installed.
    pub fn token(&self) -> Option<String> {
        self.state.lock().unwrap().token.clone()
    }

    /// Change the signed-in user's first name server-side.
    pub fn rename_user(&self, first_name: &str) {
        if let Some(user) = self.state.lock().unwrap().user.as_mut() {
            user.first_name = Some(first_name.to_string());
        }
    }

    /// Return at most `cap` items per listing page, whatever the limit.
    pub fn cap_page_size(&self, cap: u32) {
        self.state.lock().unwrap().page_cap = Some(cap);
    }

    pub fn add_product(&self, handle: &str) {
        self.state.lock().unwrap().products.push(product(handle));
    }

    pub fn add_collection(&self, handle: &str) {
        self.state.lock().unwrap().collections.push(Collection {
            id: CollectionId::new(format!("pcol_{handle}")),
            title: handle.to_string(),
            handle: handle.to_string(),
            updated_at: None,
        });
    }

    pub fn add_category(&self, handle: &str) {
        self.state.lock().unwrap().categories.push(Category {
            id: CategoryId::new(format!("pcat_{handle}")),
            name: handle.to_string(),
            handle: handle.to_string(),
            parent_category_id: None,
            updated_at: None,
        });
    }
}

#[async_trait]
impl CommerceApi for FakeCommerce {
    fn set_access_token(&self, token: Option<String>) {
        self.state.lock().unwrap().token = token;
    }

    async fn retrieve_cart(&self, cart_id: &CartId) -> Result<Cart, BackendError> {
        let mut state = self.enter("retrieve_cart")?;
        Ok(state.cart_mut(cart_id)?.clone())
    }

    async fn create_cart(&self, input: CreateCartInput) -> Result<Cart, BackendError> {
        let mut state = self.enter("create_cart")?;
        let id = state.next_id("cart");
        let mut created = cart(&id, &[]);
        created.region_id = input.region_id;
        for line in input.items {
            let line_id = state.next_id("item");
            created.items.push(LineItem {
                id: LineItemId::new(line_id),
                variant_id: line.variant_id.clone(),
                product_id: None,
                title: format!("Variant {}", line.variant_id),
                thumbnail: None,
                quantity: line.quantity,
                unit_price: Decimal::from(FAKE_UNIT_PRICE),
            });
        }
        recompute_totals(&mut created);
        state.carts.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_cart(
        &self,
        cart_id: &CartId,
        input: UpdateCartInput,
    ) -> Result<Cart, BackendError> {
        let mut state = self.enter("update_cart")?;
        if input.promo_codes.is_some() {
            state.last_promo_codes.clone_from(&input.promo_codes);
        }
        let cart = state.cart_mut(cart_id)?;
        if let Some(email) = input.email {
            cart.email = Some(email.into());
        }
        if input.shipping_address.is_some() {
            cart.shipping_address = input.shipping_address;
        }
        if input.billing_address.is_some() {
            cart.billing_address = input.billing_address;
        }
        Ok(cart.clone())
    }

    async fn add_line_item(
        &self,
        cart_id: &CartId,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<Cart, BackendError> {
        let mut state = self.enter("add_line_item")?;
        let line_id = state.next_id("item");
        let cart = state.cart_mut(cart_id)?;
        if let Some(line) = cart.items.iter_mut().find(|l| &l.variant_id == variant_id) {
            line.quantity = line.quantity.saturating_add(quantity);
        } else {
            cart.items.push(LineItem {
                id: LineItemId::new(line_id),
                variant_id: variant_id.clone(),
                product_id: None,
                title: format!("Variant {variant_id}"),
                thumbnail: None,
                quantity,
                unit_price: Decimal::from(FAKE_UNIT_PRICE),
            });
        }
        recompute_totals(cart);
        Ok(cart.clone())
    }

    async fn update_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        quantity: u32,
    ) -> Result<Cart, BackendError> {
        let mut state = self.enter("update_line_item")?;
        let cart = state.cart_mut(cart_id)?;
        let line = cart
            .items
            .iter_mut()
            .find(|l| &l.id == line_id)
            .ok_or_else(|| BackendError::NotFound(format!("line item {line_id}")))?;
        line.quantity = quantity;
        recompute_totals(cart);
        Ok(cart.clone())
    }

    async fn delete_line_item(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, BackendError> {
        let mut state = self.enter("delete_line_item")?;
        let cart = state.cart_mut(cart_id)?;
        cart.items.retain(|l| &l.id != line_id);
        recompute_totals(cart);
        Ok(cart.clone())
    }

    async fn list_shipping_options(
        &self,
        cart_id: &CartId,
    ) -> Result<Vec<ShippingOption>, BackendError> {
        let mut state = self.enter("list_shipping_options")?;
        state.cart_mut(cart_id)?;
        Ok(vec![
            ShippingOption {
                id: ShippingOptionId::new("so_standard"),
                name: "Standard".to_string(),
                amount: Decimal::from(10),
            },
            ShippingOption {
                id: ShippingOptionId::new("so_express"),
                name: "Express".to_string(),
                amount: Decimal::from(25),
            },
        ])
    }

    async fn add_shipping_method(
        &self,
        cart_id: &CartId,
        option_id: &ShippingOptionId,
    ) -> Result<Cart, BackendError> {
        let mut state = self.enter("add_shipping_method")?;
        let cart = state.cart_mut(cart_id)?;
        cart.shipping_methods = vec![ShippingMethod {
            id: format!("sm_{option_id}"),
            shipping_option_id: Some(option_id.clone()),
            name: option_id.to_string(),
            amount: Decimal::from(10),
        }];
        recompute_totals(cart);
        Ok(cart.clone())
    }

    async fn create_payment_collection(
        &self,
        cart_id: &CartId,
    ) -> Result<PaymentCollection, BackendError> {
        let mut state = self.enter("create_payment_collection")?;
        let id = state.next_id("pay_col");
        let collection = PaymentCollection {
            id: PaymentCollectionId::new(id),
            payment_sessions: Vec::new(),
        };
        state.cart_mut(cart_id)?.payment_collection = Some(collection.clone());
        Ok(collection)
    }

    async fn initiate_payment_session(
        &self,
        collection_id: &PaymentCollectionId,
        provider_id: &str,
    ) -> Result<PaymentCollection, BackendError> {
        let mut state = self.enter("initiate_payment_session")?;
        let session_id = state.next_id("payses");
        let data = if provider_id.starts_with("pp_stripe") {
            serde_json::json!({ "client_secret": "pi_test_secret_abc" })
        } else {
            serde_json::json!({})
        };
        let collection = state
            .carts
            .values_mut()
            .filter_map(|cart| cart.payment_collection.as_mut())
            .find(|collection| &collection.id == collection_id)
            .ok_or_else(|| BackendError::NotFound(format!("payment collection {collection_id}")))?;
        collection
            .payment_sessions
            .retain(|session| session.provider_id != provider_id);
        collection.payment_sessions.push(PaymentSession {
            id: PaymentSessionId::new(session_id),
            provider_id: provider_id.to_string(),
            status: Some("pending".to_string()),
            data,
        });
        Ok(collection.clone())
    }

    async fn complete_cart(&self, cart_id: &CartId) -> Result<CartCompletion, BackendError> {
        let mut state = self.enter("complete_cart")?;
        if let Some(message) = state.completion_failure.clone() {
            let cart = state.cart_mut(cart_id)?.clone();
            return Ok(CartCompletion::Cart {
                cart: Box::new(cart),
                error: Some(CompletionError { message }),
            });
        }
        let order_id = state.next_id("order");
        let cart = state
            .carts
            .remove(cart_id)
            .ok_or_else(|| BackendError::NotFound(format!("/store/carts/{cart_id}")))?;
        Ok(CartCompletion::Order {
            order: Order {
                id: OrderId::new(order_id),
                display_id: Some(1001),
                email: cart.email,
                currency_code: cart.currency_code,
                total: cart.total,
                items: cart.items,
            },
        })
    }

    async fn list_products(&self, query: &ListQuery) -> Result<Page<Product>, BackendError> {
        let state = self.enter("list_products")?;
        Ok(page(&state.products, query, state.page_cap))
    }

    async fn get_product_by_handle(&self, handle: &str) -> Result<Product, BackendError> {
        let state = self.enter("get_product_by_handle")?;
        state
            .products
            .iter()
            .find(|p| p.handle == handle)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("product {handle}")))
    }

    async fn list_collections(&self, query: &ListQuery) -> Result<Page<Collection>, BackendError> {
        let state = self.enter("list_collections")?;
        Ok(page(&state.collections, query, state.page_cap))
    }

    async fn list_categories(&self, query: &ListQuery) -> Result<Page<Category>, BackendError> {
        let state = self.enter("list_categories")?;
        Ok(page(&state.categories, query, state.page_cap))
    }

    async fn login(&self, input: &LoginInput) -> Result<AuthResponse, BackendError> {
        let mut state = self.enter("login")?;
        Ok(state.auth_response(input.email.as_str(), "Ines", "Marchetti"))
    }

    async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, BackendError> {
        let mut state = self.enter("register")?;
        Ok(state.auth_response(input.email.as_str(), &input.first_name, &input.last_name))
    }

    async fn exchange_google_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<AuthResponse, BackendError> {
        let mut state = self.enter("exchange_google_code")?;
        Ok(state.auth_response("ines@example.com", "Ines", "Marchetti"))
    }

    async fn me(&self) -> Result<Identity, BackendError> {
        let state = self.enter("me")?;
        match (&state.token, &state.user) {
            (Some(_), Some(user)) => Ok(Identity {
                user: user.clone(),
                customer: None,
            }),
            _ => Err(BackendError::Unauthorized),
        }
    }

    async fn logout(&self) -> Result<(), BackendError> {
        let mut state = self.enter("logout")?;
        state.token = None;
        Ok(())
    }

    async fn list_favorites(&self) -> Result<Vec<Favorite>, BackendError> {
        let state = self.enter("list_favorites")?;
        Ok(state.favorites())
    }

    async fn add_favorite(&self, product_id: &ProductId) -> Result<Vec<Favorite>, BackendError> {
        let mut state = self.enter("add_favorite")?;
        if !state.favorites.contains(product_id) {
            state.favorites.push(product_id.clone());
        }
        Ok(state.favorites())
    }

    async fn remove_favorite(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<Favorite>, BackendError> {
        let mut state = self.enter("remove_favorite")?;
        state.favorites.retain(|id| id != product_id);
        Ok(state.favorites())
    }

    async fn sync_favorites(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<Favorite>, BackendError> {
        let mut state = self.enter("sync_favorites")?;
        state.synced_ids = product_ids.to_vec();
        for id in product_ids {
            if !state.favorites.contains(id) {
                state.favorites.push(id.clone());
            }
        }
        Ok(state.favorites())
    }
}

/// Scripted payment processor. Confirms with `succeeded` unless a result
/// was queued.
#[derive(Default)]
pub struct FakePayments {
    responses: Mutex<VecDeque<Result<PaymentIntent, PaymentError>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    calls: AtomicU32,
}

impl FakePayments {
    pub fn respond_with(&self, result: Result<PaymentIntent, PaymentError>) {
        self.responses.lock().unwrap().push_back(result);
    }

    /// Block confirmations until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for FakePayments {
    async fn confirm_payment(
        &self,
        client_secret: &str,
        _options: &ConfirmOptions,
    ) -> Result<PaymentIntent, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(PaymentIntent {
                id: crate::payment::intent_id(client_secret)?.to_string(),
                status: atelier_core::PaymentIntentStatus::Succeeded,
                next_action_url: None,
            })
        })
    }
}

/// Services wired to in-memory fakes.
pub struct Harness {
    pub api: Arc<FakeCommerce>,
    pub payments: Arc<FakePayments>,
    pub storage: Arc<dyn KeyValueStore>,
    pub stores: Arc<ClientStores>,
    pub cache: QueryCache,
}

impl Harness {
    pub fn new() -> Self {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        Self {
            api: Arc::new(FakeCommerce::default()),
            payments: Arc::new(FakePayments::default()),
            stores: Arc::new(ClientStores::load(&storage)),
            storage,
            cache: QueryCache::new(QueryConfig {
                retry_base_delay: Duration::from_millis(1),
                ..QueryConfig::default()
            }),
        }
    }

    pub fn cart_service(&self) -> CartService {
        CartService::new(self.api.clone(), self.cache.clone(), self.stores.clone())
    }

    pub fn wishlist_service(&self) -> WishlistService {
        WishlistService::new(self.api.clone(), self.cache.clone(), self.stores.clone())
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.api.clone(), self.cache.clone(), self.stores.clone())
    }

    pub fn checkout_service(&self) -> CheckoutService {
        CheckoutService::new(
            self.api.clone(),
            Some(self.payments.clone() as Arc<dyn PaymentProcessor>),
            self.cart_service(),
        )
    }

    /// Put a signed-in session in the auth store and on the fake backend.
    pub fn sign_in(&self) {
        let response = self
            .api
            .state
            .lock()
            .unwrap()
            .auth_response("ines@example.com", "Ines", "Marchetti");
        self.api.set_access_token(Some(response.token.clone()));
        self.stores.auth.update(|auth| auth.set_session(response));
    }
}
