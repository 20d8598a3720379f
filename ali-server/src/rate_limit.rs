//! Fixed-window request limits, keyed per client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::error::ApiError;

/// Number of tracked clients above which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Allows `limit` requests per client in each `window`.
#[derive(Debug)]
pub struct RateLimiter {
    route: &'static str,
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(route: &'static str, limit: u32, window: Duration) -> Self {
        Self { route, limit, window, clients: Mutex::new(HashMap::new()) }
    }

    /// `limit` requests per minute.
    pub fn per_minute(route: &'static str, limit: u32) -> Self {
        Self::new(route, limit, Duration::from_secs(60))
    }

    /// Count one request from `client`. On rejection, returns the time left
    /// in the current window.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if clients.len() > PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client.to_string()).or_insert(Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        if entry.count >= self.limit {
            return Err(self.window.saturating_sub(now.duration_since(entry.started)));
        }
        entry.count += 1;
        Ok(())
    }
}

/// Client identity: first `X-Forwarded-For` hop, else the peer address.
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting requests over the route's limit with 429.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    match limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(route = limiter.route, client = %client, "rate limit exceeded");
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_it_elapses() {
        let limiter = RateLimiter::per_minute("/search", 2);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        let retry_after = limiter.check("a").unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("a").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_counted_separately() {
        let limiter = RateLimiter::per_minute("/upload", 1);
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_err());
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[test]
    fn forwarded_header_wins() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.9");

        let request = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");
    }
}
