//! Sitemap and robots.txt generation.
//!
//! # Usage
//!
//! ```bash
//! # Print the sitemap
//! atelier sitemap
//!
//! # Write it to a file
//! atelier sitemap --out public/sitemap.xml
//!
//! # robots.txt
//! atelier robots --out public/robots.txt
//! ```
//!
//! # Environment Variables
//!
//! - `ATELIER_BACKEND_URL` / `ATELIER_PUBLISHABLE_KEY` - catalog source
//! - `ATELIER_SITE_URL` - base for every `<loc>`

use std::path::Path;

use atelier_storefront::backend::BackendClient;
use atelier_storefront::config::StorefrontConfig;
use atelier_storefront::sitemap::{generate_sitemap, robots_txt};

use super::{CommandError, write_output};

/// Crawl the catalog and write `sitemap.xml`.
///
/// # Errors
///
/// Returns an error if configuration is missing, a listing fails or the
/// output cannot be written.
pub async fn sitemap(out: Option<&Path>) -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env()?;
    let client = BackendClient::new(&config.backend)?;

    tracing::info!(backend = %config.backend.base_url, "Generating sitemap");
    let xml = generate_sitemap(&client, &config.site_url).await?;
    write_output(out, &xml)
}

/// Write `robots.txt` for the configured site.
///
/// # Errors
///
/// Returns an error if configuration is missing or the output cannot be
/// written.
pub fn robots(out: Option<&Path>) -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env()?;
    write_output(out, &robots_txt(&config.site_url))
}
