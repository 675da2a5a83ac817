use crate::domain::QuotaDecision;
use crate::infrastructure::kv::{CounterStore, WindowStep};
use novel_errors::AppError;
use std::time::Duration;

pub const DAILY_REQUEST_LIMIT: u64 = 50;
pub const RATE_LIMIT_KEY_PREFIX: &str = "novel_ratelimit_";

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);
const STORE_KEY_PREFIX: &str = "@upstash/ratelimit";

/// Sliding-window limiter whose counters live in a [`CounterStore`].
pub struct SlidingWindowLimiter {
    store: CounterStore,
    tokens: u64,
    window_ms: i64,
}

impl SlidingWindowLimiter {
    pub fn new(store: CounterStore, tokens: u64, window: Duration) -> Self {
        Self {
            store,
            tokens,
            window_ms: window.as_millis().max(1) as i64,
        }
    }

    pub fn daily(store: CounterStore) -> Self {
        Self::new(store, DAILY_REQUEST_LIMIT, ONE_DAY)
    }

    pub async fn limit(&self, identifier: &str) -> Result<QuotaDecision, AppError> {
        self.limit_at(identifier, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn limit_at(&self, identifier: &str, now_ms: i64) -> Result<QuotaDecision, AppError> {
        let window = now_ms.div_euclid(self.window_ms);
        let step = WindowStep {
            current_key: format!("{}:{}:{}", STORE_KEY_PREFIX, identifier, window),
            previous_key: format!("{}:{}:{}", STORE_KEY_PREFIX, identifier, window - 1),
            tokens: self.tokens,
            now_ms,
            window_ms: self.window_ms,
        };

        let remaining = self.store.sliding_window(&step).await?;

        Ok(QuotaDecision {
            allowed: remaining >= 0,
            limit: self.tokens,
            remaining: remaining.max(0) as u64,
            reset: (window + 1) * self.window_ms,
        })
    }
}

/// Per-caller quota check, chosen once at startup.
pub enum QuotaGate {
    Disabled,
    Enforced(SlidingWindowLimiter),
}

impl QuotaGate {
    pub fn is_enforced(&self) -> bool {
        matches!(self, QuotaGate::Enforced(_))
    }

    /// Counts one request for `caller` and rejects it once the daily quota is used up.
    ///
    /// A failing counter store lets the request through.
    pub async fn check(&self, caller: &str) -> Result<(), AppError> {
        let limiter = match self {
            QuotaGate::Disabled => return Ok(()),
            QuotaGate::Enforced(limiter) => limiter,
        };

        let identifier = format!("{}{}", RATE_LIMIT_KEY_PREFIX, caller);
        match limiter.limit(&identifier).await {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::info!(
                        caller = %caller,
                        limit = decision.limit,
                        reset = decision.reset,
                        "Daily request limit reached"
                    );
                }
                decision.into_result()
            }
            Err(e) => {
                tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
                Ok(())
            }
        }
    }
}
