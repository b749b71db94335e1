//! UI preferences.

use atelier_core::CurrencyCode;
use serde::{Deserialize, Serialize};

/// Display preferences. Only the currency survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPrefs {
    pub currency: CurrencyCode,
    #[serde(skip)]
    cart_open: bool,
}

impl UiPrefs {
    pub fn set_currency(&mut self, currency: CurrencyCode) {
        self.currency = currency;
    }

    #[must_use]
    pub const fn is_cart_open(&self) -> bool {
        self.cart_open
    }

    pub fn open_cart(&mut self) {
        self.cart_open = true;
    }

    pub fn close_cart(&mut self) {
        self.cart_open = false;
    }

    pub fn toggle_cart(&mut self) {
        self.cart_open = !self.cart_open;
    }
}
