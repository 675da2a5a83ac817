use novel_errors::AppError;

/// Outcome of one sliding-window check.
///
/// `reset` is the end of the current window in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}

impl QuotaDecision {
    pub fn into_result(self) -> Result<(), AppError> {
        if self.allowed {
            Ok(())
        } else {
            Err(AppError::RateLimited {
                limit: self.limit,
                remaining: self.remaining,
                reset: self.reset,
            })
        }
    }
}
