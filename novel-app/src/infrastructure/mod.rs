pub mod kv;
pub mod openai;
pub mod security;
