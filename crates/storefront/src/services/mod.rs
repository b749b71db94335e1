//! Storefront services.
//!
//! Each service is a cheap-to-clone handle over the backend client, the
//! query cache and the persisted stores, and exposes an [`ActionStatus`]
//! for UI feedback.
//!
//! - [`CartService`] - Cart lifecycle and optimistic line edits
//! - [`WishlistService`] - Guest/authenticated wishlist with login merge
//! - [`AuthService`] - Sessions and reconciliation
//! - [`CheckoutService`] - Payment confirmation and order placement

mod action;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod wishlist;

pub use action::ActionStatus;
pub use auth::{AuthService, AuthTransition, Registration};
pub use cart::{CartService, LineItemDraft};
pub use checkout::{CheckoutError, CheckoutFlow, CheckoutService, OrderOutcome};
pub use wishlist::WishlistService;
