//! Anthropic Messages API 流式实现

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::{debug, error};

use super::format::build_anthropic_endpoint;
use super::openai::truncate;
use super::sse::{SseBuffer, SseFrame};
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicErrorBody {
    message: String,
}

/// 解析单个事件；流内 `error` 事件转为错误
fn parse_anthropic_data(data: &str) -> Result<Option<ChatChunk>, LlmError> {
    let event = match serde_json::from_str::<AnthropicEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            debug!("Skipping unparseable Anthropic frame: {}, data: {}", e, data);
            return Ok(None);
        }
    };

    let chunk = match event.event_type.as_str() {
        "content_block_delta" => event
            .delta
            .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
            .and_then(|d| d.text)
            .map(|text| ChatChunk {
                content: Some(text),
                finish_reason: None,
            }),
        "message_delta" => event.delta.and_then(|d| d.stop_reason).map(|reason| ChatChunk {
            content: None,
            finish_reason: Some(reason),
        }),
        "error" => {
            let message = event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string());
            return Err(LlmError::StreamError(message));
        }
        _ => None,
    };

    Ok(chunk)
}

/// 流式调用 Anthropic API
///
/// system 角色的消息合并到顶层 `system` 字段
pub fn stream_anthropic(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = build_anthropic_endpoint(base_url);
    let api_key = api_key.to_string();
    let model = model.to_string();
    let options = options.clone();
    let client = client.clone();

    Box::pin(try_stream! {
        let (system, conversation): (Vec<ChatMessage>, Vec<ChatMessage>) =
            messages.into_iter().partition(|m| m.role == "system");
        let system = (!system.is_empty()).then(|| {
            system.into_iter().map(|m| m.content).collect::<Vec<_>>().join("\n\n")
        });

        let payload = AnthropicRequest {
            model: model.clone(),
            messages: conversation,
            system,
            stream: true,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            top_p: options.top_p,
        };

        debug!("Anthropic request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Anthropic API error: status={}, body={}", status.as_u16(), truncate(&message, 500));
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
                        if let Some(chunk) = parse_anthropic_data(&data)? {
                            yield chunk;
                        }
                    }
                }
            }
        }
    })
}
