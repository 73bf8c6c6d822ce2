use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Soft per-client request cap over fixed one-minute windows.
///
/// `max_per_minute == 0` disables limiting entirely.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_minute: u32,
    windows: Mutex<HashMap<String, Window>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_per_minute > 0
    }

    /// Counts one request for `client`; `false` once the client is over
    /// its allowance for the current window.
    pub fn check(&self, client: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        // Drop stale windows so idle clients do not accumulate.
        windows.retain(|_, w| now.duration_since(w.started) < WINDOW);

        let window = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        window.count = window.count.saturating_add(1);
        window.count <= self.max_per_minute
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Client identity for rate limiting: first `x-forwarded-for` hop, then
/// `x-real-ip`, then a shared `anonymous` bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("anonymous")
        .to_string()
}
