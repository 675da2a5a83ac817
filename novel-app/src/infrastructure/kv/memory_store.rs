use super::WindowStep;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

const CLEANUP_INTERVAL_MS: i64 = 300_000;

#[derive(Clone, Copy)]
struct WindowCount {
    count: u64,
    expires_at_ms: i64,
}

/// In-process counter store. Quotas are per process and reset on restart.
pub struct MemoryStore {
    windows: DashMap<String, WindowCount>,
    last_cleanup_ms: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            last_cleanup_ms: AtomicI64::new(0),
        }
    }

    pub fn sliding_window(&self, step: &WindowStep) -> i64 {
        self.maybe_cleanup(step.now_ms);

        let previous = self
            .windows
            .get(&step.previous_key)
            .filter(|w| w.expires_at_ms > step.now_ms)
            .map(|w| w.count)
            .unwrap_or(0);

        let current = {
            let mut window = self
                .windows
                .entry(step.current_key.clone())
                .or_insert(WindowCount {
                    count: 0,
                    expires_at_ms: step.now_ms + step.expiry_ms(),
                });
            if window.expires_at_ms <= step.now_ms {
                *window = WindowCount {
                    count: 0,
                    expires_at_ms: step.now_ms + step.expiry_ms(),
                };
            }
            window.count += 1;
            window.count
        };

        let weighted_previous = (previous as f64 * step.previous_weight()).floor() as i64;
        step.tokens as i64 - (current as i64 + weighted_previous)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows.len()
    }

    fn maybe_cleanup(&self, now_ms: i64) {
        let last = self.last_cleanup_ms.load(Ordering::Relaxed);
        if now_ms - last < CLEANUP_INTERVAL_MS {
            return;
        }
        if self
            .last_cleanup_ms
            .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            let before = self.windows.len();
            self.windows.retain(|_, w| w.expires_at_ms > now_ms);
            tracing::debug!(
                "Rate limit windows cleaned up: {} -> {}",
                before,
                self.windows.len()
            );
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
