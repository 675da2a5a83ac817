mod generate_request;
mod quota;

pub use generate_request::GenerateRequest;
pub use quota::QuotaDecision;
