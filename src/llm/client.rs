//! 统一 LLM 客户端

use futures::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use super::anthropic::stream_anthropic;
use super::format::ApiFormat;
use super::openai::stream_openai;
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError, StreamCollectResult};

/// 统一 LLM 客户端
///
/// 只持有连接池与端点，不持有密钥；并发任务可以携带各自的密钥共用同一客户端
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_format: ApiFormat,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_format: ApiFormat,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_format,
        })
    }

    /// 流式聊天
    pub fn stream_chat(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>,
        model: &str,
        options: &ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
        debug!("LLM request: model={}, api_format={:?}", model, self.api_format);

        match self.api_format {
            ApiFormat::OpenAi => {
                stream_openai(&self.client, api_key, &self.base_url, messages, model, options)
            }
            ApiFormat::Anthropic => {
                stream_anthropic(&self.client, api_key, &self.base_url, messages, model, options)
            }
        }
    }

    /// 流式请求并收集完整响应
    pub async fn stream_and_collect(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>,
        model: &str,
        options: &ChatOptions,
    ) -> Result<StreamCollectResult, LlmError> {
        let mut stream = self.stream_chat(api_key, messages, model, options);
        let mut result = StreamCollectResult::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            result.chunk_count += 1;

            if let Some(content) = chunk.content {
                result.content.push_str(&content);
            }
            if chunk.finish_reason.is_some() {
                result.finish_reason = chunk.finish_reason;
            }
        }

        Ok(result)
    }
}
