//! Product comparison list.
//!
//! Holds at most [`MAX_COMPARE_ITEMS`] products. Prices are in major units.
//! Early releases persisted prices in minor units without a version marker;
//! [`CompareState::migrate`] converts those once and stamps the current
//! version so the conversion never runs twice.

use std::collections::BTreeMap;

use atelier_core::{CurrencyCode, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of products in the compare list.
pub const MAX_COMPARE_ITEMS: usize = 3;

/// Current persisted format version.
pub const COMPARE_VERSION: u32 = 2;

/// Legacy prices above this are assumed to be in minor units.
const MINOR_UNIT_THRESHOLD: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// A product in the compare list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareItem {
    pub id: ProductId,
    pub title: String,
    pub handle: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency_code: CurrencyCode,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Persisted compare list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CompareRecord")]
pub struct CompareState {
    version: u32,
    items: Vec<CompareItem>,
}

/// Accepted on-disk shapes: the versioned envelope, an unversioned
/// envelope, or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum CompareRecord {
    Envelope {
        #[serde(default)]
        version: u32,
        #[serde(default)]
        items: Vec<CompareItem>,
    },
    Bare(Vec<CompareItem>),
}

impl From<CompareRecord> for CompareState {
    fn from(record: CompareRecord) -> Self {
        match record {
            CompareRecord::Envelope { version, items } => Self { version, items },
            CompareRecord::Bare(items) => Self { version: 0, items },
        }
    }
}

impl Default for CompareState {
    fn default() -> Self {
        Self {
            version: COMPARE_VERSION,
            items: Vec::new(),
        }
    }
}

impl CompareState {
    /// Add a product. Returns `false` without changing anything if the
    /// product is already listed or the list is full.
    pub fn add(&mut self, item: CompareItem) -> bool {
        if self.contains(&item.id) || self.is_full() {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != *id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.items.iter().any(|item| item.id == *id)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_COMPARE_ITEMS
    }

    #[must_use]
    pub fn items(&self) -> &[CompareItem] {
        &self.items
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Convert legacy minor-unit prices and stamp the current version.
    ///
    /// Returns `true` if the state was upgraded and should be re-persisted.
    /// Already-current state is never touched.
    pub fn migrate(&mut self) -> bool {
        if self.version >= COMPARE_VERSION {
            return false;
        }
        for item in &mut self.items {
            if item.price > MINOR_UNIT_THRESHOLD {
                let converted = item.price / Decimal::ONE_HUNDRED;
                tracing::debug!(
                    product_id = %item.id,
                    from = %item.price,
                    to = %converted,
                    "Converted legacy compare price"
                );
                item.price = converted;
            }
        }
        self.items.truncate(MAX_COMPARE_ITEMS);
        self.version = COMPARE_VERSION;
        true
    }
}
