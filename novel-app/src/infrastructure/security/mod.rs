mod input_sanitizer;
mod rate_limiter;

pub use input_sanitizer::{PromptSanitizer, MAX_PROMPT_CHARS};
pub use rate_limiter::{QuotaGate, SlidingWindowLimiter, DAILY_REQUEST_LIMIT, RATE_LIMIT_KEY_PREFIX};
