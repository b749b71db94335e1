//! Sitemap generation from paginated catalog listings.

#![allow(clippy::unwrap_used)]

use atelier_integration_tests::TestContext;
use atelier_storefront::backend::BackendClient;
use atelier_storefront::sitemap::generate_sitemap;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn products(range: std::ops::Range<u32>) -> Vec<Value> {
    range
        .map(|i| {
            json!({
                "id": format!("prod_{i}"),
                "title": format!("Bag {i}"),
                "handle": format!("bag-{i}"),
                "updated_at": "2026-03-01T10:00:00Z"
            })
        })
        .collect()
}

#[tokio::test]
async fn test_sitemap_covers_every_listing_page() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/store/products"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": products(0..100), "count": 130, "offset": 0, "limit": 100
        })))
        .expect(1)
        .mount(&ctx.backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/products"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": products(100..130), "count": 130, "offset": 100, "limit": 100
        })))
        .expect(1)
        .mount(&ctx.backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [{ "id": "pcol_1", "title": "Spring", "handle": "spring" }],
            "count": 1, "offset": 0, "limit": 100
        })))
        .mount(&ctx.backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "categories": [], "count": 0, "offset": 0, "limit": 100
        })))
        .mount(&ctx.backend)
        .await;

    let client = BackendClient::new(&ctx.config().backend).unwrap();
    let xml = generate_sitemap(&client, "https://atelier.test").await.unwrap();

    assert!(xml.contains("<loc>https://atelier.test/products/bag-129</loc>"));
    assert!(xml.contains("<lastmod>2026-03-01</lastmod>"));
    assert!(xml.contains("<loc>https://atelier.test/collections/spring</loc>"));
    assert_eq!(xml.matches("/products/").count(), 130);
}
