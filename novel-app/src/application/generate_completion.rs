use crate::infrastructure::openai::{OpenAiClient, TextStream};
use crate::infrastructure::security::PromptSanitizer;
use novel_errors::AppError;

pub struct GenerateCompletion {
    client: OpenAiClient,
}

impl GenerateCompletion {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    pub async fn execute(&self, raw_prompt: &str) -> Result<TextStream, AppError> {
        let prompt = PromptSanitizer::sanitize(raw_prompt);
        tracing::debug!(
            raw_len = raw_prompt.len(),
            sanitized_chars = prompt.chars().count(),
            model = %self.client.profile().model,
            "Requesting completion"
        );

        self.client.stream_chat(&prompt).await
    }
}
