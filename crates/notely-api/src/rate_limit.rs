use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::routes::user_fingerprint;

/// Fixed-window request limiter.
///
/// Each `(endpoint, user)` pair gets its own window; users are tracked by
/// fingerprint only, so raw ids never sit in the table.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    windows: Arc<Mutex<HashMap<(ProtectedEndpoint, u64), RateWindow>>>,
    window: Duration,
    sync: Arc<EndpointBudget>,
    list: Arc<EndpointBudget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    NotesSync,
    NotesList,
}

/// Per-endpoint limit plus the counters exposed on `/healthz`
struct EndpointBudget {
    limit: u32,
    allowed: AtomicU64,
    limited: AtomicU64,
}

impl EndpointBudget {
    const fn new(limit: u32) -> Self {
        Self {
            limit,
            allowed: AtomicU64::new(0),
            limited: AtomicU64::new(0),
        }
    }

    fn record(&self, admitted: bool) {
        let counter = if admitted {
            &self.allowed
        } else {
            &self.limited
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub sync_allowed: u64,
    pub sync_limited: u64,
    pub list_allowed: u64,
    pub list_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl RateWindow {
    const fn open(now: Instant) -> Self {
        Self {
            started_at: now,
            count: 0,
        }
    }

    fn is_expired(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started_at) >= length
    }

    /// Whole seconds until the window closes, rounded up and never zero
    fn retry_after_secs(&self, now: Instant, length: Duration) -> u64 {
        let remaining = length.saturating_sub(now.duration_since(self.started_at));
        let rounded_up = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        rounded_up.max(1)
    }
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_rate_limit_per_window,
            config.list_rate_limit_per_window,
        )
    }

    fn new(window: Duration, sync_limit: u32, list_limit: u32) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            sync: Arc::new(EndpointBudget::new(sync_limit)),
            list: Arc::new(EndpointBudget::new(list_limit)),
        }
    }

    fn budget(&self, endpoint: ProtectedEndpoint) -> &EndpointBudget {
        match endpoint {
            ProtectedEndpoint::NotesSync => &self.sync,
            ProtectedEndpoint::NotesList => &self.list,
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let budget = self.budget(endpoint);
        let user = user_fingerprint(user_id);
        let now = Instant::now();

        let mut windows = self.windows.lock().await;
        windows.retain(|_, window| !window.is_expired(now, self.window));
        let window = windows
            .entry((endpoint, user))
            .or_insert_with(|| RateWindow::open(now));

        if window.count >= budget.limit {
            let retry_after_secs = window.retry_after_secs(now, self.window);
            budget.record(false);
            tracing::warn!(
                endpoint = endpoint.label(),
                user,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Too many {} requests", endpoint.label()),
                retry_after_secs,
            ));
        }

        window.count += 1;
        budget.record(true);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            sync_allowed: self.sync.allowed.load(Ordering::Relaxed),
            sync_limited: self.sync.limited.load(Ordering::Relaxed),
            list_allowed: self.list.allowed.load(Ordering::Relaxed),
            list_limited: self.list.limited.load(Ordering::Relaxed),
        }
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotesSync => "notes_sync",
            Self::NotesList => "notes_list",
        }
    }
}
