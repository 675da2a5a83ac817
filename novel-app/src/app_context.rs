use crate::application::GenerateCompletion;
use crate::config::{AppConfig, RateLimitStore};
use crate::infrastructure::kv::{CounterStore, MemoryStore, RestStore};
use crate::infrastructure::openai::OpenAiClient;
use crate::infrastructure::security::{QuotaGate, SlidingWindowLimiter};
use novel_errors::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub generate_completion: Arc<GenerateCompletion>,
    pub quota_gate: Arc<QuotaGate>,
}

impl AppContext {
    pub fn new(generate_completion: GenerateCompletion, quota_gate: QuotaGate) -> Self {
        Self {
            generate_completion: Arc::new(generate_completion),
            quota_gate: Arc::new(quota_gate),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = OpenAiClient::new(&config.openai)?;
        tracing::info!(
            "Using completion API at {} (model {})",
            config.openai.base_url,
            config.openai.model
        );

        Ok(Self::new(
            GenerateCompletion::new(client),
            Self::quota_gate(config)?,
        ))
    }

    fn quota_gate(config: &AppConfig) -> Result<QuotaGate, AppError> {
        if !config.rate_limiting_enabled() {
            tracing::info!("Rate limiting disabled ({:?})", config.environment);
            return Ok(QuotaGate::Disabled);
        }

        let store = match (config.rate_limit_store, &config.kv) {
            (RateLimitStore::Memory, _) => {
                tracing::info!("Rate limiting with in-process counters");
                CounterStore::Memory(MemoryStore::new())
            }
            (RateLimitStore::Rest, Some(kv)) => {
                tracing::info!("Rate limiting with KV store at {}", kv.rest_url);
                CounterStore::Rest(RestStore::new(kv)?)
            }
            (RateLimitStore::Rest, None) => return Ok(QuotaGate::Disabled),
        };

        Ok(QuotaGate::Enforced(SlidingWindowLimiter::daily(store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn context(vars: &[(&str, &str)]) -> AppContext {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        AppContext::from_config(&config).unwrap()
    }

    #[test]
    fn test_gate_selection() {
        let base = [("OPENAI_API_KEY", "sk-test")];
        assert!(!context(&base).quota_gate.is_enforced());

        let kv = [
            ("OPENAI_API_KEY", "sk-test"),
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("KV_REST_API_TOKEN", "token"),
        ];
        assert!(context(&kv).quota_gate.is_enforced());

        let dev = [
            ("OPENAI_API_KEY", "sk-test"),
            ("APP_ENV", "development"),
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("KV_REST_API_TOKEN", "token"),
        ];
        assert!(!context(&dev).quota_gate.is_enforced());

        let memory = [("OPENAI_API_KEY", "sk-test"), ("RATE_LIMIT_STORE", "memory")];
        assert!(context(&memory).quota_gate.is_enforced());
    }
}
