//! LLM 后端适配层
//!
//! 按名称选择后端，统一为「一个 Prompt 进，一段文本出」的调用约定。
//! 密钥随每次调用传入，后端实例之间不共享任何可变状态。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::BackendProfile;
use crate::llm::{detect_api_format, ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::services::doc_generator::PipelineError;

/// LLM 后端
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &str;

    /// 发送单个 Prompt，返回生成文本
    async fn complete(&self, prompt: &str, credential: &str) -> Result<String, LlmError>;
}

/// 基于 HTTP 聊天接口的后端
pub struct ChatBackend {
    profile: BackendProfile,
    client: LlmClient,
}

impl ChatBackend {
    pub fn new(profile: BackendProfile, request_timeout: Duration) -> Result<Self, LlmError> {
        let api_format = profile
            .api_format
            .unwrap_or_else(|| detect_api_format(&profile.model));
        let client = LlmClient::new(&profile.base_url, api_format, request_timeout)?;
        Ok(Self { profile, client })
    }

    fn options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.profile.temperature,
            top_p: self.profile.top_p,
            max_tokens: self.profile.max_tokens,
        }
    }

    fn messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.profile.system_prompt {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }
}

#[async_trait]
impl LlmBackend for ChatBackend {
    fn name(&self) -> &str {
        &self.profile.name
    }

    async fn complete(&self, prompt: &str, credential: &str) -> Result<String, LlmError> {
        let result = self
            .client
            .stream_and_collect(credential, self.messages(prompt), &self.profile.model, &self.options())
            .await?;

        debug!(
            "{} returned {} chunks, finish_reason={:?}",
            self.profile.name, result.chunk_count, result.finish_reason
        );
        Ok(result.content.trim().to_string())
    }
}

/// 后端注册表（名称 -> 实现）
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    names: Vec<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建所有 HTTP 后端
    pub fn from_profiles(
        profiles: &[BackendProfile],
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut registry = Self::new();
        for profile in profiles {
            registry.register(Arc::new(ChatBackend::new(profile.clone(), request_timeout)?));
        }
        Ok(registry)
    }

    /// 注册后端，同名（忽略大小写）覆盖
    pub fn register(&mut self, backend: Arc<dyn LlmBackend>) {
        let key = normalize(backend.name());
        if self.backends.insert(key, backend.clone()).is_none() {
            self.names.push(backend.name().to_string());
        }
    }

    /// 已注册的后端名称（注册顺序）
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(&normalize(name))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmBackend>, PipelineError> {
        self.backends
            .get(&normalize(name))
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedBackend {
                name: name.to_string(),
            })
    }

    /// 调用指定后端
    ///
    /// 传输、鉴权、超时等错误统一转为 `PipelineError::Backend`，此处不重试
    pub async fn call(&self, name: &str, prompt: &str, credential: &str) -> Result<String, PipelineError> {
        let backend = self.get(name)?;
        let started = Instant::now();

        match backend.complete(prompt, credential).await {
            Ok(text) => {
                debug!(
                    "Backend {} completed in {} ms ({} chars)",
                    backend.name(),
                    started.elapsed().as_millis(),
                    text.len()
                );
                Ok(text)
            }
            Err(e) => {
                if e.is_auth_failure() {
                    warn!("Backend {} rejected the credential", backend.name());
                } else {
                    warn!("Backend {} call failed: {}", backend.name(), e);
                }
                Err(PipelineError::Backend {
                    provider: backend.name().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
