use super::prompt::CompletionProfile;
use super::sse::{SseDecoder, SseEvent};
use super::types::ChatCompletionChunk;
use crate::config::OpenAiConfig;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use novel_errors::AppError;
use std::pin::Pin;
use std::time::Duration;

/// Ordered completion text as it arrives. Dropping it closes the upstream response.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    profile: CompletionProfile,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, AppError> {
        // No overall timeout: a completion stream may legitimately run for minutes.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            profile: CompletionProfile::new(config.model.clone()),
        })
    }

    pub fn profile(&self) -> &CompletionProfile {
        &self.profile
    }

    pub async fn stream_chat(&self, prompt: &str) -> Result<TextStream, AppError> {
        let request = self.profile.build_request(prompt);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Completion(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Completion API error: {} - {}", status, body);
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(text_stream(response)))
    }
}

fn text_stream(response: reqwest::Response) -> impl Stream<Item = Result<String, AppError>> + Send {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut finished = false;

        while !finished {
            let events = match body.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| AppError::Completion(e.to_string()))?;
                    decoder.push(&chunk)
                }
                None => {
                    finished = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for event in events {
                match event {
                    SseEvent::Done => {
                        finished = true;
                        break;
                    }
                    SseEvent::Data(payload) => {
                        if let Some(text) = parse_chunk(&payload)? {
                            yield text;
                        }
                    }
                }
            }
        }
        tracing::debug!("Completion stream finished");
    }
}

fn parse_chunk(payload: &str) -> Result<Option<String>, AppError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| AppError::Completion(format!("malformed stream chunk: {}", e)))?;

    if let Some(error) = &chunk.error {
        return Err(AppError::Completion(format!("stream error: {}", error)));
    }
    Ok(chunk.text())
}
