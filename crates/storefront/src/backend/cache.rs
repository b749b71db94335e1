//! Cache types for catalog responses.

use super::types::{Category, Collection, ListQuery, Page, Product};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(String),
    Products(ListQuery),
    Collections(ListQuery),
    Categories(ListQuery),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Page<Product>),
    Collections(Page<Collection>),
    Categories(Page<Category>),
}
