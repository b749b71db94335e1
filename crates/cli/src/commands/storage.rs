//! Persisted client storage maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Rewrite legacy namespaces in place (compare-list prices, wishlist alignment)
//! atelier storage migrate --dir .atelier
//!
//! # Pretty-print one namespace (the auth token is redacted)
//! atelier storage show atelier-compare
//! ```

use std::path::Path;

use atelier_storefront::storage::{FileStore, KeyValueStore, keys, load_json, save_json};
use atelier_storefront::stores::{CompareState, WishlistState};

use super::CommandError;

/// Outcome of a migration run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub compare_migrated: bool,
    pub wishlist_repaired: bool,
}

/// Run every storage migration against `dir`.
///
/// # Errors
///
/// Returns an error if a migrated namespace cannot be written back.
pub fn migrate(dir: &Path) -> Result<MigrationReport, CommandError> {
    let store = FileStore::new(dir);
    let mut report = MigrationReport::default();

    if let Some(mut compare) = load_json::<CompareState>(&store, keys::COMPARE)
        && compare.migrate()
    {
        save_json(&store, keys::COMPARE, &compare)?;
        report.compare_migrated = true;
        tracing::info!(items = compare.items().len(), "Migrated compare list");
    }

    if let Some(mut wishlist) = load_json::<WishlistState>(&store, keys::WISHLIST)
        && wishlist.repair()
    {
        save_json(&store, keys::WISHLIST, &wishlist)?;
        report.wishlist_repaired = true;
        tracing::info!(items = wishlist.len(), "Repaired wishlist");
    }

    if report == MigrationReport::default() {
        tracing::info!(dir = %dir.display(), "Storage already up to date");
    }
    Ok(report)
}

/// Pretty-printed contents of `namespace`, or `None` if it is empty.
///
/// # Errors
///
/// Returns an error for an unknown namespace or undecodable contents.
pub fn show(dir: &Path, namespace: &str) -> Result<Option<String>, CommandError> {
    if !keys::ALL.contains(&namespace) {
        return Err(CommandError::UnknownNamespace(
            namespace.to_string(),
            keys::ALL.join(", "),
        ));
    }

    let store = FileStore::new(dir);
    let Some(raw) = store.get_raw(namespace)? else {
        return Ok(None);
    };
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| CommandError::Json {
            namespace: namespace.to_string(),
            source,
        })?;

    if namespace == keys::AUTH
        && let Some(token) = value.get_mut("token").filter(|t| !t.is_null())
    {
        *token = serde_json::Value::String("[REDACTED]".to_string());
    }

    serde_json::to_string_pretty(&value)
        .map(Some)
        .map_err(|source| CommandError::Json {
            namespace: namespace.to_string(),
            source,
        })
}
