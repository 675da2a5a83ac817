mod client;
mod prompt;
mod sse;
mod types;

pub use client::{OpenAiClient, TextStream};
pub use prompt::{CompletionProfile, SYSTEM_INSTRUCTION};
pub use sse::{SseDecoder, SseEvent};
pub use types::{ChatCompletionChunk, ChatCompletionRequest, Message};
