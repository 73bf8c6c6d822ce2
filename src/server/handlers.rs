use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::rate_limit::client_key;
use super::thumbnail::ThumbnailRequest;
use super::{
    apply_cors, cacheable_json_response, json_bytes_response, json_response, ApiError, AppState,
};
use crate::feed::normalize::is_garbled;
use crate::news::{cache_key, cursor_page, offset_page, Cursor, FeedProfile, NewsItem, Topic};

type Params = Query<HashMap<String, String>>;

const STREAM_TIMELINE_KEY: &str = "timeline";
const THUMBNAIL_CACHE_CONTROL: &str = "max-age=3600";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyResponse {
    items: Vec<NewsItem>,
    provider: &'static str,
    next_page: Option<usize>,
    next_cursor: Option<String>,
}

/// Normalized `/news-proxy` query.
#[derive(Debug, Clone, PartialEq)]
struct ProxyQuery {
    topic: Topic,
    sort: String,
    /// Lowercased search text; empty means no filter.
    q: String,
    limit: usize,
    page: usize,
}

impl ProxyQuery {
    fn from_params(params: &HashMap<String, String>, profile: &FeedProfile) -> Self {
        let param = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        Self {
            topic: Topic::parse_or_default(param("topic")),
            sort: param("sort").unwrap_or("latest").to_ascii_lowercase(),
            q: param("q").unwrap_or_default().to_lowercase(),
            limit: profile.clamp_limit(param("limit")),
            page: param("page")
                .and_then(|p| p.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1),
        }
    }

    fn cache_key(&self) -> String {
        let limit = self.limit.to_string();
        let page = self.page.to_string();
        cache_key([
            ("topic", self.topic.as_str()),
            ("sort", self.sort.as_str()),
            ("q", self.q.as_str()),
            ("limit", limit.as_str()),
            ("page", page.as_str()),
        ])
    }

    fn matches(&self, item: &NewsItem) -> bool {
        self.q.is_empty()
            || item.title.to_lowercase().contains(&self.q)
            || item
                .summary
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(&self.q))
    }
}

fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let client = client_key(headers);
    if state.rate_limiter.check(&client) {
        Ok(())
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        Err(ApiError::RateLimited)
    }
}

fn require_sources(profile: &FeedProfile) -> Result<(), ApiError> {
    if profile.sources.is_empty() {
        return Err(ApiError::NoSourcesConfigured(profile.name.clone()));
    }
    Ok(())
}

fn drop_garbled(items: &mut Vec<NewsItem>) {
    let before = items.len();
    items.retain(|item| {
        !is_garbled(&item.title) && !item.summary.as_deref().is_some_and(is_garbled)
    });
    if items.len() < before {
        tracing::debug!(dropped = before - items.len(), "Dropped garbled items");
    }
}

/// `GET /news-proxy`: topic-filtered, searchable, offset-paginated news,
/// or a resized thumbnail when `thumb=1`.
pub async fn news_proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state, &headers)?;

    if params.get("thumb").map(String::as_str) == Some("1") {
        return thumbnail(&state, &headers, &params).await;
    }

    require_sources(&state.proxy_profile)?;
    let query = ProxyQuery::from_params(&params, &state.proxy_profile);
    let body = state
        .proxy_cache
        .get_or_try_insert_with(&query.cache_key(), || build_proxy_body(&state, &query))
        .await?;

    Ok(cacheable_json_response(body))
}

async fn build_proxy_body(state: &AppState, query: &ProxyQuery) -> Result<Bytes, ApiError> {
    let profile = &state.proxy_profile;
    let mut items = state
        .aggregator
        .aggregate(&profile.sources, query.topic, profile.normalize_options())
        .await;

    items.retain(|item| query.matches(item));
    drop_garbled(&mut items);

    if state.thumbnails.config().rewrite_images {
        for image in items.iter_mut().filter_map(|item| item.image.as_mut()) {
            *image = state.thumbnails.proxied_image_url(image);
        }
    }

    let page = offset_page(items, query.page, query.limit);
    let response = ProxyResponse {
        items: page.items,
        provider: "none",
        next_page: page.next_page,
        next_cursor: None,
    };
    Ok(Bytes::from(serde_json::to_vec(&response)?))
}

async fn thumbnail(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
    let request = ThumbnailRequest::from_query(params, accept, state.thumbnails.config())?;
    let image = state.thumbnails.get(&request).await?;

    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(request.format.mime()));
    let mut response = (StatusCode::OK, image.body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL));
    apply_cors(headers);
    Ok(response)
}

/// `GET /news-stream`: the merged timeline, one cursor page at a time.
pub async fn news_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state, &headers)?;
    require_sources(&state.stream_profile)?;

    let cursor = params
        .get("cursor")
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::parse::<Cursor>)
        .transpose()?;

    let timeline = stream_timeline(&state).await;
    let page = cursor_page(&timeline, cursor.as_ref(), state.stream_profile.page_size);
    let body = serde_json::to_vec(&page)?;
    Ok(json_bytes_response(StatusCode::OK, Bytes::from(body)))
}

async fn stream_timeline(state: &AppState) -> Arc<Vec<NewsItem>> {
    if let Some(hit) = state.stream_cache.get(STREAM_TIMELINE_KEY) {
        return hit;
    }
    let profile = &state.stream_profile;
    let mut items = state
        .aggregator
        .aggregate(&profile.sources, Topic::All, profile.normalize_options())
        .await;
    drop_garbled(&mut items);

    let timeline = Arc::new(items);
    state.stream_cache.insert(STREAM_TIMELINE_KEY, Arc::clone(&timeline));
    timeline
}

pub async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors(response.headers_mut());
    response
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

pub async fn health() -> Response {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}
