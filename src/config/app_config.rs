//! 应用配置管理
//!
//! 提供配置的加载、保存、更新功能，使用全局单例模式管理配置状态。
//! 单次生成任务的参数（后端、密钥、模块勾选等）不在这里，见 `GenerationConfig`。

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::error::AppError;
use crate::llm::ApiFormat;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "DOCGEN_CONFIG";

/// 获取配置文件路径
///
/// 优先 `DOCGEN_CONFIG`，否则为可执行文件同级目录下的 config.json
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub generation: GenerationSettings,

    /// 可选的 LLM 后端
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            analyzer: AnalyzerConfig::default(),
            generation: GenerationSettings::default(),
            backends: default_backends(),
        }
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 已结束的运行保留多久（秒）后从内存移除
    #[serde(default = "default_run_retention_secs")]
    pub run_retention_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_run_retention_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            run_retention_secs: default_run_retention_secs(),
        }
    }
}

/// 外部静态分析器配置
///
/// 实际命令为 `[program, args..., project_dir]`，
/// 产物位于 `<output_root>/<项目目录名>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_program")]
    pub program: String,
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
}

fn default_analyzer_program() -> String {
    "java".to_string()
}

fn default_analyzer_args() -> Vec<String> {
    vec![
        "-jar".to_string(),
        "../model/CodeSumCCA-javaparser.jar".to_string(),
    ]
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: default_analyzer_program(),
            args: default_analyzer_args(),
            output_root: default_output_root(),
        }
    }
}

/// 生成流程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// 文档生成阶段的并发调用数（1-10）
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 自定义 Prompt 最大字符数
    #[serde(default = "default_max_custom_prompt_chars")]
    pub max_custom_prompt_chars: usize,

    /// 单次 LLM 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 特征提炼阶段是否调用 LLM 生成摘要
    #[serde(default = "default_summarize_features")]
    pub summarize_features: bool,

    /// 非 Java 关键文件的摘录长度（字符）
    #[serde(default = "default_key_file_excerpt_chars")]
    pub key_file_excerpt_chars: usize,
}

fn default_concurrency() -> usize {
    3
}

fn default_max_custom_prompt_chars() -> usize {
    500
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_summarize_features() -> bool {
    true
}

fn default_key_file_excerpt_chars() -> usize {
    2000
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_custom_prompt_chars: default_max_custom_prompt_chars(),
            request_timeout_secs: default_request_timeout_secs(),
            summarize_features: default_summarize_features(),
            key_file_excerpt_chars: default_key_file_excerpt_chars(),
        }
    }
}

/// LLM 后端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    /// 后端名称（匹配时忽略大小写）
    pub name: String,
    /// 线格式，缺省时按模型名推断
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_format: Option<ApiFormat>,
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// 附加的 system 消息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_backends() -> Vec<BackendProfile> {
    vec![
        BackendProfile {
            name: "chatgpt".to_string(),
            api_format: Some(ApiFormat::OpenAi),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: Some(0.7),
            top_p: Some(1.0),
            max_tokens: Some(512),
            system_prompt: None,
        },
        BackendProfile {
            name: "qwen".to_string(),
            api_format: Some(ApiFormat::OpenAi),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "qwen-max".to_string(),
            temperature: Some(0.7),
            top_p: Some(0.8),
            max_tokens: Some(512),
            system_prompt: None,
        },
        BackendProfile {
            name: "claude".to_string(),
            api_format: Some(ApiFormat::Anthropic),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            temperature: Some(0.7),
            top_p: None,
            max_tokens: Some(1024),
            system_prompt: None,
        },
        BackendProfile {
            name: "deepseek".to_string(),
            api_format: Some(ApiFormat::OpenAi),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            system_prompt: Some("You are a helpful assistant".to_string()),
        },
    ]
}

/// 全局配置单例
static CONFIG: Lazy<RwLock<AppConfig>> =
    Lazy::new(|| RwLock::new(load_config_from_file().unwrap_or_default()));

/// 从文件加载配置
fn load_config_from_file() -> Option<AppConfig> {
    let path = get_config_path();
    if !path.exists() {
        return None;
    }

    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Ignoring malformed config file {}: {}", path.display(), e);
            None
        }
    }
}

/// 保存配置到文件
fn save_config_to_file(config: &AppConfig) -> Result<(), AppError> {
    let path = get_config_path();
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("序列化配置失败: {}", e)))?;
    fs::write(&path, content)
        .map_err(|e| AppError::Config(format!("写入配置文件失败: {}", e)))?;
    Ok(())
}

/// 获取当前配置（克隆）
pub fn get_config() -> AppConfig {
    CONFIG.read().clone()
}

/// 更新配置
///
/// 接收一个闭包来修改配置，修改后自动保存到文件
pub fn update_config<F>(updater: F) -> Result<AppConfig, AppError>
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = CONFIG.write();
    let mut updated = config.clone();
    updater(&mut updated);
    save_config_to_file(&updated)?;
    *config = updated.clone();
    Ok(updated)
}

/// 替换整个配置（命令行指定配置文件时使用，不落盘）
pub fn set_config(new_config: AppConfig) {
    *CONFIG.write() = new_config;
}

/// 重新从文件加载配置
pub fn reload_config() -> bool {
    match load_config_from_file() {
        Some(config) => {
            *CONFIG.write() = config;
            true
        }
        None => false,
    }
}
