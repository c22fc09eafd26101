//! API 格式检测和端点构建

use serde::{Deserialize, Serialize};

/// API 线格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    /// OpenAI Chat Completions（DeepSeek、DashScope 兼容模式同样适用）
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic Messages
    Anthropic,
}

/// 未显式配置格式时，按模型名推断
pub fn detect_api_format(model: &str) -> ApiFormat {
    if model.to_lowercase().contains("claude") {
        ApiFormat::Anthropic
    } else {
        ApiFormat::OpenAi
    }
}

/// 去掉末尾斜杠并折叠路径中的双斜杠（保留协议部分）
pub fn fix_base_url(base_url: &str) -> String {
    let url = base_url.trim().trim_end_matches('/');

    match url.find("://") {
        Some(pos) => {
            let (scheme, rest) = url.split_at(pos + 3);
            let mut rest = rest.to_string();
            while rest.contains("//") {
                rest = rest.replace("//", "/");
            }
            format!("{}{}", scheme, rest)
        }
        None => url.to_string(),
    }
}

/// OpenAI 兼容端点
pub fn build_openai_endpoint(base_url: &str) -> String {
    let url = fix_base_url(base_url);

    if url.ends_with("/chat/completions") {
        url
    } else if url.ends_with("/v1") {
        format!("{}/chat/completions", url)
    } else {
        format!("{}/v1/chat/completions", url)
    }
}

/// Anthropic Messages 端点
pub fn build_anthropic_endpoint(base_url: &str) -> String {
    let url = fix_base_url(base_url);

    if url.ends_with("/messages") {
        url
    } else if url.ends_with("/v1") {
        format!("{}/messages", url)
    } else {
        format!("{}/v1/messages", url)
    }
}
