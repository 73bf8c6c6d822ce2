//! End-to-end tests for the HTTP surface.
//!
//! Each test drives the axum router in-process with `oneshot` while
//! wiremock serves the upstream RSS feeds, so the whole pipeline (fetch,
//! decode, parse, normalize, merge, cache, paginate) runs for real.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsrelay::config::ThumbnailConfig;
use newsrelay::feed::{Decoder, FeedFetcher, FeedSource, FetchSettings};
use newsrelay::news::{Aggregator, FeedProfile, Topic};
use newsrelay::server::{router, AppState, RateLimiter, ThumbnailProxy};

// ============================================================================
// Helpers
// ============================================================================

const JAN_1: &str = "Mon, 01 Jan 2024 00:00:00 +0000";
const JAN_2: &str = "Tue, 02 Jan 2024 00:00:00 +0000";

/// `(title, link, pubDate)` triples rendered as an RSS 2.0 document.
fn rss(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    let head = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<rss version="2.0"><channel><title>T</title>"#,
    );
    format!("{head}{body}</channel></rss>")
}

async fn serve_feed(server: &MockServer, feed_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(feed_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn source(server: &MockServer, name: &str, feed_path: &str) -> FeedSource {
    FeedSource::new(name, format!("{}{feed_path}", server.uri()), Topic::Crypto)
}

fn profiles(
    proxy_sources: Vec<FeedSource>,
    stream_sources: Vec<FeedSource>,
) -> (FeedProfile, FeedProfile) {
    let mut proxy = FeedProfile::proxy();
    proxy.sources = proxy_sources;
    let mut stream = FeedProfile::stream();
    stream.sources = stream_sources;
    (proxy, stream)
}

fn build_app(
    proxy: FeedProfile,
    stream: FeedProfile,
    thumbnails: ThumbnailConfig,
    limiter: RateLimiter,
) -> Router {
    let client = reqwest::Client::new();
    let fetcher = FeedFetcher::new(client.clone(), FetchSettings::default(), Decoder::default());
    let state = AppState::new(
        Aggregator::new(fetcher),
        proxy,
        stream,
        ThumbnailProxy::new(client, thumbnails),
        limiter,
    );
    router(Arc::new(state))
}

fn app(proxy: FeedProfile, stream: FeedProfile) -> Router {
    build_app(proxy, stream, ThumbnailConfig::default(), RateLimiter::disabled())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn titles(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_two_sources_merge_newest_first_without_tracking_params() {
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/a",
        rss(&[("BTC surges", "http://a.example/1?utm_source=x", JAN_2)]),
    )
    .await;
    serve_feed(
        &server,
        "/b",
        rss(&[("ETH update", "http://b.example/2", JAN_1)]),
    )
    .await;

    let (proxy, stream) = profiles(
        vec![source(&server, "B", "/b"), source(&server, "A", "/a")],
        vec![],
    );
    let app = app(proxy, stream);

    let (status, body) = get_json(&app, "/news-proxy").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["BTC surges", "ETH update"]);
    assert_eq!(body["items"][0]["url"], "http://a.example/1");
    assert_eq!(body["items"][0]["publishedAt"], "2024-01-02T00:00:00.000Z");
    assert_eq!(body["items"][1]["url"], "http://b.example/2");
    assert_eq!(body["provider"], "none");
    assert_eq!(body["nextPage"], Value::Null);
    assert_eq!(body["nextCursor"], Value::Null);
}

#[tokio::test]
async fn test_duplicate_links_across_sources_collapse() {
    let server = MockServer::start().await;
    let date = JAN_2;
    let tracked = "https://n.example/s?utm_medium=rss";
    serve_feed(&server, "/a", rss(&[("Same story", tracked, date)])).await;
    serve_feed(&server, "/b", rss(&[("Same story", "https://n.example/s#top", date)])).await;

    let (proxy, stream) = profiles(
        vec![source(&server, "A", "/a"), source(&server, "B", "/b")],
        vec![],
    );
    let (_, body) = get_json(&app(proxy, stream), "/news-proxy").await;

    assert_eq!(titles(&body), vec!["Same story"]);
    assert_eq!(body["items"][0]["source"], "A");
}

#[tokio::test]
async fn test_dead_source_does_not_fail_request() {
    let server = MockServer::start().await;
    serve_feed(&server, "/ok", rss(&[("Alive", "https://n.example/1", JAN_2)])).await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (proxy, stream) = profiles(
        vec![source(&server, "Down", "/down"), source(&server, "Ok", "/ok")],
        vec![],
    );
    let (status, body) = get_json(&app(proxy, stream), "/news-proxy").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["Alive"]);
}

#[tokio::test]
async fn test_topic_and_search_filters() {
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/mixed",
        rss(&[
            ("비트코인 반등", "https://n.example/1", "Tue, 02 Jan 2024 03:00:00 +0000"),
            ("코스피 상승 마감", "https://n.example/2", "Tue, 02 Jan 2024 02:00:00 +0000"),
            ("원달러 환율 하락", "https://n.example/3", "Tue, 02 Jan 2024 01:00:00 +0000"),
        ]),
    )
    .await;

    let (proxy, stream) = profiles(vec![source(&server, "Mixed", "/mixed")], vec![]);
    let app = app(proxy, stream);

    let (_, body) = get_json(&app, "/news-proxy?topic=stocks").await;
    assert_eq!(titles(&body), vec!["코스피 상승 마감"]);
    assert_eq!(body["items"][0]["topic"], "stocks");

    let (_, body) = get_json(&app, "/news-proxy").await;
    assert_eq!(titles(&body), vec!["비트코인 반등"]);

    let (_, body) = get_json(&app, "/news-proxy?topic=all").await;
    assert_eq!(titles(&body).len(), 3);

    let (_, body) = get_json(&app, "/news-proxy?topic=all&q=%ED%99%98%EC%9C%A8").await;
    assert_eq!(titles(&body), vec!["원달러 환율 하락"]);
}

#[tokio::test]
async fn test_offset_pagination_on_proxy() {
    let server = MockServer::start().await;
    let newest = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let items: Vec<(String, String, String)> = (1..=5)
        .map(|i| {
            (
                format!("Item {i}"),
                format!("https://n.example/{i}"),
                (newest - ChronoDuration::minutes(i)).to_rfc2822(),
            )
        })
        .collect();
    let refs: Vec<(&str, &str, &str)> = items
        .iter()
        .map(|(t, l, d)| (t.as_str(), l.as_str(), d.as_str()))
        .collect();
    serve_feed(&server, "/feed", rss(&refs)).await;

    let (proxy, stream) = profiles(vec![source(&server, "S", "/feed")], vec![]);
    let app = app(proxy, stream);

    let (_, body) = get_json(&app, "/news-proxy?limit=2&page=1").await;
    assert_eq!(titles(&body), vec!["Item 1", "Item 2"]);
    assert_eq!(body["nextPage"], 2);

    let (_, body) = get_json(&app, "/news-proxy?limit=2&page=3").await;
    assert_eq!(titles(&body), vec!["Item 5"]);
    assert_eq!(body["nextPage"], Value::Null);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_cache_hit_is_byte_identical_and_expires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[(
            "First",
            "https://n.example/1",
            "Tue, 02 Jan 2024 00:00:00 +0000",
        )])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve_feed(
        &server,
        "/feed",
        rss(&[
            ("Second", "https://n.example/2", "Wed, 03 Jan 2024 00:00:00 +0000"),
            ("First", "https://n.example/1", JAN_2),
        ]),
    )
    .await;

    let (mut proxy, stream) = profiles(vec![source(&server, "S", "/feed")], vec![]);
    proxy.cache_ttl = Duration::from_millis(500);
    let app = app(proxy, stream);

    let (_, _, first) = get(&app, "/news-proxy?topic=crypto&limit=30").await;
    let (_, _, second) = get(&app, "/news-proxy?limit=30&topic=crypto").await;
    assert_eq!(first, second);

    tokio::time::sleep(Duration::from_millis(700)).await;

    let (_, third) = get_json(&app, "/news-proxy?topic=crypto&limit=30").await;
    assert_eq!(titles(&third), vec!["Second", "First"]);
}

#[tokio::test]
async fn test_zero_ttl_always_refetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[(
            "Only",
            "https://n.example/1",
            "Tue, 02 Jan 2024 00:00:00 +0000",
        )])))
        .expect(2)
        .mount(&server)
        .await;

    let (mut proxy, stream) = profiles(vec![source(&server, "S", "/feed")], vec![]);
    proxy.cache_ttl = Duration::ZERO;
    let app = app(proxy, stream);

    get(&app, "/news-proxy").await;
    get(&app, "/news-proxy").await;
}

// ============================================================================
// Stream
// ============================================================================

#[tokio::test]
async fn test_stream_cursor_walks_45_items_in_three_pages() {
    let server = MockServer::start().await;
    let newest = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let items: Vec<(String, String, String)> = (1..=45)
        .map(|i| {
            (
                format!("Item {i}"),
                format!("https://n.example/{i}"),
                (newest - ChronoDuration::minutes(i)).to_rfc2822(),
            )
        })
        .collect();
    let refs: Vec<(&str, &str, &str)> = items
        .iter()
        .map(|(t, l, d)| (t.as_str(), l.as_str(), d.as_str()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(&refs)))
        .expect(1)
        .mount(&server)
        .await;

    let (proxy, stream) = profiles(vec![], vec![source(&server, "S", "/feed")]);
    let app = app(proxy, stream);
    let expected = |range: std::ops::RangeInclusive<usize>| -> Vec<String> {
        range.map(|i| format!("Item {i}")).collect()
    };

    let (status, first) = get_json(&app, "/news-stream").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&first), expected(1..=20));
    assert_eq!(first["nextCursor"], first["items"][19]["publishedAt"]);

    let cursor = first["nextCursor"].as_str().unwrap().to_string();
    let (_, second) = get_json(&app, &format!("/functions/v1/news-stream?cursor={cursor}")).await;
    assert_eq!(titles(&second), expected(21..=40));

    let cursor = second["nextCursor"].as_str().unwrap().to_string();
    let (_, third) = get_json(&app, &format!("/news-stream?cursor={cursor}")).await;
    assert_eq!(titles(&third), expected(41..=45));
    assert_eq!(third["nextCursor"], Value::Null);
}

#[tokio::test]
async fn test_invalid_cursor_is_rejected() {
    let server = MockServer::start().await;
    serve_feed(&server, "/feed", rss(&[("A", "https://n.example/1", JAN_2)])).await;
    let (proxy, stream) = profiles(vec![], vec![source(&server, "S", "/feed")]);

    let (status, body) = get_json(&app(proxy, stream), "/news-stream?cursor=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_cursor");
}

// ============================================================================
// Protocol edges
// ============================================================================

#[tokio::test]
async fn test_cors_and_cache_headers_on_json() {
    let server = MockServer::start().await;
    serve_feed(&server, "/feed", rss(&[("A", "https://n.example/1", JAN_2)])).await;
    let (proxy, stream) = profiles(vec![source(&server, "S", "/feed")], vec![]);

    let (_, headers, _) = get(&app(proxy, stream), "/functions/v1/news-proxy").await;
    assert_eq!(headers["content-type"], "application/json; charset=utf-8");
    assert_eq!(headers["cache-control"], "max-age=60");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
}

#[tokio::test]
async fn test_stream_responses_are_not_client_cacheable() {
    let server = MockServer::start().await;
    serve_feed(&server, "/feed", rss(&[("A", "https://n.example/1", JAN_2)])).await;
    let (proxy, stream) = profiles(vec![], vec![source(&server, "S", "/feed")]);

    let (status, headers, _) = get(&app(proxy, stream), "/functions/v1/news-stream").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json; charset=utf-8");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.get("cache-control").is_none());
}

#[tokio::test]
async fn test_preflight_and_method_not_allowed() {
    let (proxy, stream) = profiles(vec![], vec![]);
    let app = app(proxy, stream);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/news-proxy")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(body.is_empty());

    let request = Request::builder()
        .method("DELETE")
        .uri("/news-stream")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "method_not_allowed");
}

#[tokio::test]
async fn test_missing_sources_and_unknown_paths() {
    let (proxy, stream) = profiles(vec![], vec![]);
    let app = app(proxy, stream);

    let (status, body) = get_json(&app, "/news-proxy").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "no_sources_configured");

    let (status, body) = get_json(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let (proxy, stream) = profiles(vec![], vec![]);
    let app = build_app(proxy, stream, ThumbnailConfig::default(), RateLimiter::new(1));

    let request = || {
        Request::builder()
            .uri("/news-stream?cursor=bad")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };
    let (status, _, _) = send(&app, request()).await;
    assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "rate_limited");
}

#[tokio::test]
async fn test_thumbnail_proxy_through_router() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"jpeg-bytes".to_vec())
                .insert_header("content-type", "image/jpeg"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (proxy, stream) = profiles(vec![], vec![]);
    let thumbnails = ThumbnailConfig {
        upstream: upstream.uri(),
        ..ThumbnailConfig::default()
    };
    let app = build_app(proxy, stream, thumbnails, RateLimiter::disabled());

    let uri = "/news-proxy?thumb=1&u=https%3A%2F%2Fcdn.example.com%2Fa.jpg&fmt=jpeg";
    let (status, headers, body) = get(&app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/jpeg");
    assert_eq!(headers["cache-control"], "max-age=3600");
    assert_eq!(&body[..], b"jpeg-bytes");

    let (_, _, again) = get(&app, uri).await;
    assert_eq!(again, body);

    let private = "/news-proxy?thumb=1&u=http%3A%2F%2F10.0.0.1%2Fa.jpg";
    let (status, body) = get_json(&app, private).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_url");
}

#[tokio::test]
async fn test_image_rewrite_points_at_thumbnail_endpoint() {
    let server = MockServer::start().await;
    let feed = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
<item><title>With image</title><link>https://n.example/1</link>
<description><![CDATA[<p><img src="//cdn.example.com/pic.jpg"> body</p>]]></description>
<pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate></item>
</channel></rss>"#;
    serve_feed(&server, "/feed", feed.to_string()).await;

    let (proxy, stream) = profiles(vec![source(&server, "S", "/feed")], vec![]);
    let thumbnails = ThumbnailConfig {
        rewrite_images: true,
        ..ThumbnailConfig::default()
    };
    let app = build_app(proxy, stream, thumbnails, RateLimiter::disabled());

    let (_, body) = get_json(&app, "/news-proxy").await;
    assert_eq!(
        body["items"][0]["image"],
        concat!(
            "/functions/v1/news-proxy?thumb=1",
            "&u=https%3A%2F%2Fcdn.example.com%2Fpic.jpg&w=160&h=90&fmt=webp&q=75",
        )
    );
    assert_eq!(body["items"][0]["summary"], "body");
}
