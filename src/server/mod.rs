//! HTTP surface: `/news-proxy`, `/news-stream` and their `/functions/v1/`
//! aliases, served with axum.
mod error;
pub mod handlers;
pub mod rate_limit;
pub mod thumbnail;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use thumbnail::ThumbnailProxy;

use axum::body::Bytes;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::news::{Aggregator, FeedProfile, NewsItem, TtlCache};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const JSON_CACHE_CONTROL: &str = "max-age=60";

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub proxy_profile: FeedProfile,
    /// Serialized `/news-proxy` responses keyed by normalized query.
    pub proxy_cache: TtlCache<Bytes>,
    pub stream_profile: FeedProfile,
    /// The merged `/news-stream` timeline; cursor pages are cut from it.
    pub stream_cache: TtlCache<Arc<Vec<NewsItem>>>,
    pub thumbnails: ThumbnailProxy,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        aggregator: Aggregator,
        proxy_profile: FeedProfile,
        stream_profile: FeedProfile,
        thumbnails: ThumbnailProxy,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            aggregator,
            proxy_cache: TtlCache::unbounded(proxy_profile.cache_ttl),
            proxy_profile,
            stream_cache: TtlCache::unbounded(stream_profile.cache_ttl),
            stream_profile,
            thumbnails,
            rate_limiter,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let fetcher = FeedFetcher::new(client.clone(), config.fetch_settings(), config.decoder());
        Self::new(
            Aggregator::new(fetcher),
            config.proxy_profile(),
            config.stream_profile(),
            ThumbnailProxy::new(client, config.thumbnails.clone()),
            RateLimiter::new(config.rate_limit.max_per_minute),
        )
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let proxy: MethodRouter<Arc<AppState>> = get(handlers::news_proxy)
        .options(handlers::preflight)
        .fallback(handlers::method_not_allowed);
    let stream: MethodRouter<Arc<AppState>> = get(handlers::news_stream)
        .options(handlers::preflight)
        .fallback(handlers::method_not_allowed);

    Router::new()
        .route(
            "/health",
            get(handlers::health)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .route("/news-proxy", proxy.clone())
        .route("/functions/v1/news-proxy", proxy)
        .route("/news-stream", stream.clone())
        .route("/functions/v1/news-stream", stream)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
    );
}

/// JSON body with the shared content type and CORS headers.
pub(crate) fn json_bytes_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    apply_cors(headers);
    response
}

/// [`json_bytes_response`] that clients may cache for a minute.
pub(crate) fn cacheable_json_response(body: Bytes) -> Response {
    let mut response = json_bytes_response(StatusCode::OK, body);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(JSON_CACHE_CONTROL));
    response
}

pub(crate) fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    json_bytes_response(status, Bytes::from(body.to_string()))
}
