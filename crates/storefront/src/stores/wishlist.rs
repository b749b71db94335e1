//! Wishlist state.
//!
//! The wishlist keeps two parallel lists: product IDs (for cheap membership
//! checks) and item details (for rendering). Both are only ever modified
//! together, so `item_ids[i] == items[i].product_id` holds after every
//! operation.

use atelier_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backend::Favorite;

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl WishlistItem {
    /// An item known only by its product ID.
    #[must_use]
    pub const fn bare(product_id: ProductId) -> Self {
        Self {
            product_id,
            title: None,
            handle: None,
            thumbnail: None,
            price: None,
        }
    }
}

impl From<Favorite> for WishlistItem {
    fn from(favorite: Favorite) -> Self {
        match favorite.product {
            Some(product) => Self {
                product_id: favorite.product_id,
                title: Some(product.title),
                handle: Some(product.handle),
                thumbnail: product.thumbnail,
                price: product.price,
            },
            None => Self::bare(favorite.product_id),
        }
    }
}

/// Persisted wishlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WishlistState {
    item_ids: Vec<ProductId>,
    items: Vec<WishlistItem>,
}

impl WishlistState {
    /// Add an item. Returns `false` if it was already saved.
    pub fn add(&mut self, item: WishlistItem) -> bool {
        if self.contains(&item.product_id) {
            return false;
        }
        self.item_ids.push(item.product_id.clone());
        self.items.push(item);
        true
    }

    /// Remove an item. Returns `false` if it was not saved.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let Some(index) = self.item_ids.iter().position(|id| id == product_id) else {
            return false;
        };
        self.item_ids.remove(index);
        self.items.remove(index);
        true
    }

    /// Add the item if absent, remove it if present. Returns whether it is
    /// saved afterwards.
    pub fn toggle(&mut self, item: WishlistItem) -> bool {
        if self.remove(&item.product_id) {
            false
        } else {
            self.add(item)
        }
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.item_ids.contains(product_id)
    }

    /// Adopt a canonical list, dropping duplicates but keeping order.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = WishlistItem>) {
        self.clear();
        for item in items {
            self.add(item);
        }
    }

    pub fn clear(&mut self) {
        self.item_ids.clear();
        self.items.clear();
    }

    #[must_use]
    pub fn ids(&self) -> &[ProductId] {
        &self.item_ids
    }

    #[must_use]
    pub fn items(&self) -> &[WishlistItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Rebuild the ID list from the item list if they have drifted apart.
    /// Returns whether anything changed.
    pub fn repair(&mut self) -> bool {
        let aligned = self.item_ids.len() == self.items.len()
            && self
                .item_ids
                .iter()
                .zip(&self.items)
                .all(|(id, item)| *id == item.product_id);
        if aligned {
            return false;
        }
        let items = std::mem::take(&mut self.items);
        self.replace_all(items);
        true
    }
}
