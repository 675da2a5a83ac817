use novel_errors::AppError;
use std::net::SocketAddr;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo-16k";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Only `development` selects local development; any other value is a deployment.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("development") {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStore {
    Rest,
    Memory,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub rest_url: String,
    pub rest_token: String,
}

/// Process configuration, loaded once at startup and handed to [`crate::AppContext`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub openai: OpenAiConfig,
    pub kv: Option<KvConfig>,
    pub rate_limit_store: RateLimitStore,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = var("APP_ENV")
            .or_else(|| var("NODE_ENV"))
            .map(|v| Environment::from_env_value(&v))
            .unwrap_or(Environment::Production);

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR: {}", e)))?;

        let api_key = var("OPENAI_API_KEY")
            .ok_or_else(|| AppError::Config("OPENAI_API_KEY must be set".to_string()))?;
        let base_url = parse_url(
            "OPENAI_BASE_URL",
            var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        )?;
        let model = var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let kv = match (var("KV_REST_API_URL"), var("KV_REST_API_TOKEN")) {
            (Some(url), Some(token)) => Some(KvConfig {
                rest_url: parse_url("KV_REST_API_URL", url)?,
                rest_token: token,
            }),
            _ => None,
        };

        let rate_limit_store = match var("RATE_LIMIT_STORE").as_deref() {
            None | Some("rest") => RateLimitStore::Rest,
            Some("memory") => RateLimitStore::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "RATE_LIMIT_STORE must be `rest` or `memory`, got `{}`",
                    other
                )))
            }
        };

        Ok(Self {
            environment,
            bind_addr,
            openai: OpenAiConfig {
                api_key,
                base_url,
                model,
            },
            kv,
            rate_limit_store,
        })
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        if self.environment == Environment::Development {
            return false;
        }
        match self.rate_limit_store {
            RateLimitStore::Rest => self.kv.is_some(),
            RateLimitStore::Memory => true,
        }
    }
}

fn parse_url(name: &str, raw: String) -> Result<String, AppError> {
    let parsed = url::Url::parse(&raw).map_err(|e| AppError::Config(format!("{}: {}", name, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        scheme => Err(AppError::Config(format!(
            "{}: unsupported scheme `{}`",
            name, scheme
        ))),
    }
}
