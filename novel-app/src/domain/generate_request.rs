use serde::Deserialize;

/// Body of an inbound completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}
