mod app_error;

pub use app_error::{AppError, RATE_LIMIT_MESSAGE};
