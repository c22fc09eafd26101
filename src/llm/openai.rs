//! OpenAI Chat Completions 流式实现
//!
//! 同时服务 DeepSeek、DashScope 兼容模式等 OpenAI 兼容接口

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::{debug, error};

use super::format::build_openai_endpoint;
use super::sse::{SseBuffer, SseFrame};
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError};

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

/// 解析单个 SSE 数据帧，无法识别的帧返回 None
fn parse_openai_data(data: &str) -> Option<ChatChunk> {
    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk.choices.into_iter().next().map(|choice| ChatChunk {
            content: choice.delta.content,
            finish_reason: choice.finish_reason,
        }),
        Err(e) => {
            debug!("Skipping unparseable OpenAI frame: {}, data: {}", e, data);
            None
        }
    }
}

/// 流式调用 OpenAI 兼容接口
pub fn stream_openai(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = build_openai_endpoint(base_url);
    let api_key = api_key.to_string();
    let model = model.to_string();
    let options = options.clone();
    let client = client.clone();

    Box::pin(try_stream! {
        let payload = OpenAiRequest {
            model: model.clone(),
            messages,
            stream: true,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        debug!("OpenAI request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .bearer_auth(&api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("OpenAI API error: status={}, body={}", status.as_u16(), truncate(&message, 500));
            Err::<(), _>(LlmError::ApiError { status: status.as_u16(), message })?;
            return;
        }

        let mut buffer = SseBuffer::default();
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            for frame in buffer.push(&bytes?) {
                match frame {
                    SseFrame::Done => return,
                    SseFrame::Data(data) => {
                        if let Some(chunk) = parse_openai_data(&data) {
                            yield chunk;
                        }
                    }
                }
            }
        }
    })
}

/// 按字符截断（用于日志）
pub(super) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
