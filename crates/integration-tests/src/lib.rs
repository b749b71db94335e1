//! End-to-end test support for the Atelier storefront client.
//!
//! Each [`TestContext`] starts two `wiremock` servers, one standing in for
//! the commerce backend and one for the payment processor, plus a
//! temporary storage directory. [`TestContext::state`] builds a real
//! [`AppState`] (HTTP clients, file storage) pointed at them.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::MockServer;

use atelier_storefront::config::{BackendConfig, PaymentConfig, QueryConfig, StorefrontConfig};
use atelier_storefront::state::AppState;
use atelier_storefront::storage::{FileStore, KeyValueStore};

/// Publishable key the mocked backend expects.
pub const PUBLISHABLE_KEY: &str = "pk_test_atelier";

/// Mocked services and a scratch storage directory.
pub struct TestContext {
    pub backend: MockServer,
    pub payments: MockServer,
    pub storage_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self {
            backend: MockServer::start().await,
            payments: MockServer::start().await,
            storage_dir: TempDir::new().unwrap(),
        }
    }

    /// Configuration pointing at the mocks, with millisecond retry backoff.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        StorefrontConfig {
            backend: BackendConfig {
                base_url: self.backend.uri(),
                publishable_key: SecretString::from(PUBLISHABLE_KEY.to_string()),
                region_id: Some("reg_eu".to_string()),
                timeout: Duration::from_secs(5),
            },
            payment: PaymentConfig {
                api_url: self.payments.uri(),
                publishable_key: Some(SecretString::from("pk_test_payments".to_string())),
                provider_id: "pp_stripe_stripe".to_string(),
            },
            query: QueryConfig {
                retry_base_delay: Duration::from_millis(1),
                ..QueryConfig::default()
            },
            site_url: "https://atelier.test".to_string(),
            storage_dir: self.storage_dir.path().to_path_buf(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// A fresh `AppState`, rehydrated from the storage directory.
    #[must_use]
    pub fn state(&self) -> AppState {
        AppState::new(self.config()).unwrap()
    }

    /// Direct access to the persisted namespaces.
    #[must_use]
    pub fn storage(&self) -> FileStore {
        FileStore::new(self.storage_dir.path())
    }

    /// Write raw JSON into a namespace before the state is built.
    pub fn seed(&self, key: &str, value: &Value) {
        self.storage().set_raw(key, &value.to_string()).unwrap();
    }

    /// Read a namespace back as JSON.
    #[must_use]
    pub fn persisted(&self, key: &str) -> Option<Value> {
        self.storage()
            .get_raw(key)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }
}

/// Backend cart JSON with `(line_id, variant_id, quantity)` lines priced at 100.
#[must_use]
pub fn cart_json(id: &str, lines: &[(&str, &str, u32)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|(line_id, variant_id, quantity)| {
            json!({
                "id": line_id,
                "variant_id": variant_id,
                "product_id": null,
                "title": format!("Variant {variant_id}"),
                "thumbnail": null,
                "quantity": quantity,
                "unit_price": 100
            })
        })
        .collect();
    let subtotal: u32 = lines.iter().map(|(_, _, quantity)| quantity * 100).sum();
    json!({
        "id": id,
        "region_id": "reg_eu",
        "currency_code": "eur",
        "email": "ines@example.com",
        "items": items,
        "shipping_methods": [],
        "shipping_address": null,
        "billing_address": null,
        "item_subtotal": subtotal,
        "total": subtotal,
        "payment_collection": null
    })
}

/// Backend auth response for the test customer.
#[must_use]
pub fn auth_json(token: &str) -> Value {
    json!({
        "token": token,
        "user": {
            "id": "user_ines",
            "email": "ines@example.com",
            "first_name": "Ines",
            "last_name": "Marchetti"
        },
        "customer": null
    })
}

/// `{ "favorites": [...] }` with bare entries.
#[must_use]
pub fn favorites_json(ids: &[&str]) -> Value {
    let favorites: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "product_id": id, "product": null }))
        .collect();
    json!({ "favorites": favorites })
}
