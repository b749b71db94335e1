//! Atelier storefront client library.
//!
//! Client-side commerce state for a headless storefront: the backend
//! REST client, persisted stores (auth, UI preferences, wishlist, compare
//! list, cart ID), a server-state query cache with optimistic updates, and
//! the cart, wishlist, auth and checkout services built on them.
//!
//! [`state::AppState`] wires everything together and is the usual entry
//! point.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod payment;
pub mod query;
pub mod services;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod stores;

#[cfg(test)]
mod testing;
