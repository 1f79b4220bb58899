//! Request layers: request ids, bearer auth for `/internal/*` and a separate
//! fixed-window quota per public route group.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use brandnotify_core::{AppConfig, Environment};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id stored as a request extension and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuse the caller's id when it is short printable ASCII, else mint one.
    fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| {
                !id.is_empty()
                    && id.len() <= MAX_REQUEST_ID_LEN
                    && id.bytes().all(|b| b.is_ascii_graphic())
            })
            .map_or_else(|| Self(Uuid::new_v4().to_string()), |id| Self(id.to_string()))
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(|| Uuid::new_v4().to_string(), |id| id.0.clone())
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = RequestId::from_headers(req.headers());
    let echoed = HeaderValue::from_str(&id.0).ok();
    req.extensions_mut().insert(id);

    let mut res = next.run(req).await;
    if let Some(value) = echoed {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Bearer tokens accepted on the internal event endpoint. `None` means open.
#[derive(Debug, Clone)]
pub struct InternalAuth {
    keys: Option<Arc<HashSet<String>>>,
}

impl InternalAuth {
    /// Use `config.api_keys`. Without keys the routes stay open in
    /// development and startup fails in every other environment.
    ///
    /// # Errors
    ///
    /// Returns an error outside development when no key is configured.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if !config.api_keys.is_empty() {
            return Ok(Self::with_keys(config.api_keys.iter().cloned()));
        }
        if config.env == Environment::Development {
            tracing::warn!("no internal API keys configured, /internal routes are open");
            return Ok(Self::disabled());
        }
        anyhow::bail!(
            "BRANDNOTIFY_API_KEYS must list at least one bearer token in {}",
            config.env
        )
    }

    #[must_use]
    pub fn with_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: Some(Arc::new(keys.into_iter().collect())),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { keys: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.keys.is_some()
    }

    fn admits(&self, headers: &HeaderMap) -> bool {
        match &self.keys {
            None => true,
            Some(keys) => bearer_token(headers).is_some_and(|token| keys.contains(token)),
        }
    }
}

/// Token of an `Authorization: Bearer <token>` header. The scheme is
/// case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn require_bearer_auth(
    State(auth): State<InternalAuth>,
    req: Request,
    next: Next,
) -> Response {
    if auth.admits(req.headers()) {
        return next.run(req).await;
    }

    tracing::warn!(path = %req.uri().path(), "internal request without a valid bearer token");
    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

#[derive(Debug)]
struct QuotaWindow {
    opened_at: Instant,
    used: u32,
}

/// Fixed-window request quota for one route group.
#[derive(Debug, Clone)]
pub struct RouteQuota {
    group: &'static str,
    limit: u32,
    period: Duration,
    window: Arc<Mutex<QuotaWindow>>,
}

impl RouteQuota {
    #[must_use]
    pub fn new(group: &'static str, limit: u32, period: Duration) -> Self {
        Self {
            group,
            limit,
            period,
            window: Arc::new(Mutex::new(QuotaWindow {
                opened_at: Instant::now(),
                used: 0,
            })),
        }
    }

    #[must_use]
    pub fn per_minute(group: &'static str, limit: u32) -> Self {
        Self::new(group, limit, Duration::from_secs(60))
    }

    /// Count one request. `Err` carries the time until the window reopens.
    async fn admit(&self) -> Result<(), Duration> {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        if now.duration_since(window.opened_at) >= self.period {
            window.opened_at = now;
            window.used = 0;
        }

        if window.used >= self.limit {
            let open_for = now.duration_since(window.opened_at);
            return Err(self.period.saturating_sub(open_for));
        }
        window.used += 1;
        Ok(())
    }
}

/// Quotas for the public opt-out routes. The JSON API and the emailed link
/// page count separately, so a flood on one leaves the other usable.
#[derive(Debug, Clone)]
pub struct PublicQuotas {
    pub opt_out_api: RouteQuota,
    pub opt_out_link: RouteQuota,
}

impl PublicQuotas {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::per_minute(config.public_rate_limit)
    }

    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self {
            opt_out_api: RouteQuota::per_minute("opt_out_api", limit),
            opt_out_link: RouteQuota::per_minute("opt_out_link", limit),
        }
    }
}

pub async fn enforce_rate_limit(
    State(quota): State<RouteQuota>,
    req: Request,
    next: Next,
) -> Response {
    let wait = match quota.admit().await {
        Ok(()) => return next.run(req).await,
        Err(wait) => wait,
    };

    let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    tracing::warn!(group = quota.group, retry_after, "rate limit exceeded");
    let mut res = ApiError::new(
        request_id_of(&req),
        "rate_limited",
        format!("too many requests to {}", quota.group),
    )
    .into_response();
    res.headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
    res
}
