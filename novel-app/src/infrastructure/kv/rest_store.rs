use super::WindowStep;
use crate::config::KvConfig;
use novel_errors::AppError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const SLIDING_WINDOW_SCRIPT: &str = include_str!("sliding_window.lua");

#[derive(Debug, Deserialize)]
struct RestResponse {
    result: Option<Value>,
    error: Option<String>,
}

/// Redis spoken over the Upstash / Vercel KV REST protocol.
pub struct RestStore {
    http_client: reqwest::Client,
    url: String,
    token: String,
}

impl RestStore {
    pub fn new(config: &KvConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Internal(format!("KV client: {}", e)))?;

        Ok(Self {
            http_client,
            url: config.rest_url.clone(),
            token: config.rest_token.clone(),
        })
    }

    pub async fn sliding_window(&self, step: &WindowStep) -> Result<i64, AppError> {
        let command = json!([
            "EVAL",
            SLIDING_WINDOW_SCRIPT,
            "2",
            step.current_key,
            step.previous_key,
            step.tokens.to_string(),
            step.now_ms.to_string(),
            step.window_ms.to_string(),
            "1",
        ]);

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| AppError::CounterStore(e.to_string()))?;

        let status = response.status();
        let body: RestResponse = response
            .json()
            .await
            .map_err(|e| AppError::CounterStore(format!("{}: {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(AppError::CounterStore(error));
        }

        match body.result {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| AppError::CounterStore(format!("non-integer result {}", n))),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| AppError::CounterStore(format!("non-integer result {}", s))),
            other => Err(AppError::CounterStore(format!(
                "unexpected result {:?}",
                other
            ))),
        }
    }
}
