//! LLM 模块
//!
//! 提供 OpenAI 兼容格式与 Anthropic 格式的流式 HTTP 客户端。
//! 客户端不持有密钥，每次请求显式传入。

mod anthropic;
mod client;
mod format;
mod openai;
mod sse;
mod types;

pub use client::LlmClient;
pub use format::{detect_api_format, ApiFormat};
pub use types::*;
