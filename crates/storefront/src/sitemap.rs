//! Sitemap and robots.txt generation from the catalog listings.

use std::fmt::Write as _;
use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::backend::{BackendError, CommerceApi, ListQuery, Page};

/// Listing page size used while crawling the catalog.
const PAGE_SIZE: u32 = 100;

/// Pages that exist regardless of catalog content.
const STATIC_PAGES: &[(&str, &str, &str)] = &[
    ("/", "daily", "1.0"),
    ("/store", "daily", "0.9"),
    ("/collections", "weekly", "0.7"),
    ("/about", "monthly", "0.4"),
    ("/contact", "monthly", "0.3"),
];

/// Paths crawlers should skip.
const DISALLOWED: &[&str] = &["/account", "/cart", "/checkout", "/wishlist"];

struct Entry {
    loc: String,
    lastmod: Option<DateTime<Utc>>,
    changefreq: &'static str,
    priority: &'static str,
}

/// Build `sitemap.xml` for every product, collection and category.
///
/// # Errors
///
/// Returns the first listing failure; no partial sitemap is produced.
#[instrument(skip(api))]
pub async fn generate_sitemap(api: &dyn CommerceApi, site_url: &str) -> Result<String, BackendError> {
    let base = site_url.trim_end_matches('/');

    let products = collect_all(|query| async move { api.list_products(&query).await }).await?;
    let collections =
        collect_all(|query| async move { api.list_collections(&query).await }).await?;
    let categories =
        collect_all(|query| async move { api.list_categories(&query).await }).await?;

    let mut entries: Vec<Entry> = STATIC_PAGES
        .iter()
        .map(|(path, changefreq, priority)| Entry {
            loc: format!("{base}{path}"),
            lastmod: None,
            changefreq,
            priority,
        })
        .collect();
    entries.extend(products.into_iter().map(|p| Entry {
        loc: format!("{base}/products/{}", p.handle),
        lastmod: p.updated_at,
        changefreq: "weekly",
        priority: "0.8",
    }));
    entries.extend(collections.into_iter().map(|c| Entry {
        loc: format!("{base}/collections/{}", c.handle),
        lastmod: c.updated_at,
        changefreq: "weekly",
        priority: "0.6",
    }));
    entries.extend(categories.into_iter().map(|c| Entry {
        loc: format!("{base}/categories/{}", c.handle),
        lastmod: c.updated_at,
        changefreq: "weekly",
        priority: "0.6",
    }));

    tracing::info!(urls = entries.len(), "Generated sitemap");
    Ok(render(&entries))
}

/// `robots.txt` pointing at the sitemap.
#[must_use]
pub fn robots_txt(site_url: &str) -> String {
    let base = site_url.trim_end_matches('/');
    let mut out = String::from("User-agent: *\nAllow: /\n");
    for path in DISALLOWED {
        let _ = writeln!(out, "Disallow: {path}");
    }
    let _ = write!(out, "\nSitemap: {base}/sitemap.xml\n");
    out
}

async fn collect_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, BackendError>
where
    F: FnMut(ListQuery) -> Fut,
    Fut: Future<Output = Result<Page<T>, BackendError>>,
{
    let mut query = ListQuery {
        limit: PAGE_SIZE,
        ..ListQuery::default()
    };
    let mut items = Vec::new();
    loop {
        let page = fetch(query.clone()).await?;
        let more = page.has_more();
        let fetched = page.items.len();
        items.extend(page.items);
        if !more {
            return Ok(items);
        }
        query = query.next_page(fetched);
    }
}

fn render(entries: &[Entry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        xml.push_str("  <url>\n");
        let _ = writeln!(xml, "    <loc>{}</loc>", escape(&entry.loc));
        if let Some(lastmod) = entry.lastmod {
            let _ = writeln!(xml, "    <lastmod>{}</lastmod>", lastmod.format("%Y-%m-%d"));
        }
        let _ = writeln!(xml, "    <changefreq>{}</changefreq>", entry.changefreq);
        let _ = writeln!(xml, "    <priority>{}</priority>", entry.priority);
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
