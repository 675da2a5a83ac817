//! Counter stores backing the sliding-window limiter.
//!
//! Both backends execute one window step atomically: read the previous
//! window, increment the current one and report the raw remaining quota.

mod memory_store;
mod rest_store;

pub use memory_store::MemoryStore;
pub use rest_store::RestStore;

use novel_errors::AppError;

/// One sliding-window evaluation against a store.
#[derive(Debug, Clone)]
pub struct WindowStep {
    pub current_key: String,
    pub previous_key: String,
    pub tokens: u64,
    pub now_ms: i64,
    pub window_ms: i64,
}

impl WindowStep {
    /// Share of the previous window that still overlaps the trailing window.
    fn previous_weight(&self) -> f64 {
        1.0 - (self.now_ms.rem_euclid(self.window_ms) as f64 / self.window_ms as f64)
    }

    fn expiry_ms(&self) -> i64 {
        self.window_ms * 2 + 1000
    }
}

pub enum CounterStore {
    Rest(RestStore),
    Memory(MemoryStore),
}

impl CounterStore {
    /// Returns `tokens - (current + weighted previous)` after counting this call.
    /// Negative means the caller is over quota.
    pub async fn sliding_window(&self, step: &WindowStep) -> Result<i64, AppError> {
        match self {
            CounterStore::Rest(store) => store.sliding_window(step).await,
            CounterStore::Memory(store) => Ok(store.sliding_window(step)),
        }
    }
}
