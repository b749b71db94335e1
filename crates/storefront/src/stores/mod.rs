//! Persisted client state.
//!
//! Each store is a plain state type with typed operations; [`ClientStores`]
//! binds them to their storage namespaces.

pub mod auth;
pub mod compare;
pub mod ui;
pub mod wishlist;

use std::sync::Arc;

use atelier_core::CartId;

pub use auth::AuthState;
pub use compare::{CompareItem, CompareState, MAX_COMPARE_ITEMS};
pub use ui::UiPrefs;
pub use wishlist::{WishlistItem, WishlistState};

use crate::storage::{KeyValueStore, Persisted, keys};

/// All persisted client stores, rehydrated from one storage backend.
pub struct ClientStores {
    pub auth: Persisted<AuthState>,
    pub ui: Persisted<UiPrefs>,
    pub wishlist: Persisted<WishlistState>,
    pub compare: Persisted<CompareState>,
    pub cart_id: Persisted<Option<CartId>>,
}

impl ClientStores {
    /// Rehydrate every namespace, running the compare-price migration and
    /// repairing a misaligned wishlist.
    pub fn load(storage: &Arc<dyn KeyValueStore>) -> Self {
        Self {
            auth: Persisted::load(storage.clone(), keys::AUTH),
            ui: Persisted::load(storage.clone(), keys::UI),
            wishlist: Persisted::load_migrating(
                storage.clone(),
                keys::WISHLIST,
                WishlistState::repair,
            ),
            compare: Persisted::load_migrating(
                storage.clone(),
                keys::COMPARE,
                CompareState::migrate,
            ),
            cart_id: Persisted::load(storage.clone(), keys::CART_ID),
        }
    }
}
