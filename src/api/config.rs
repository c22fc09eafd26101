//! 配置管理端点

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    get_config, reload_config, update_config, AnalyzerConfig, AppConfig, GenerationSettings,
};
use crate::error::{AppError, AppResult};
use crate::services::BackendRegistry;
use crate::state::AppState;

/// 连接测试时使用的超时
const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 配置响应（后端只列出名称和模型）
#[derive(Serialize)]
pub struct ConfigResponse {
    pub analyzer: AnalyzerConfig,
    pub generation: GenerationSettings,
    pub backends: Vec<BackendSummary>,
}

#[derive(Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub model: String,
    pub base_url: String,
}

impl From<AppConfig> for ConfigResponse {
    fn from(config: AppConfig) -> Self {
        Self {
            analyzer: config.analyzer,
            generation: config.generation,
            backends: config
                .backends
                .into_iter()
                .map(|b| BackendSummary {
                    name: b.name,
                    model: b.model,
                    base_url: b.base_url,
                })
                .collect(),
        }
    }
}

/// 配置更新请求（只更新给出的字段）
#[derive(Deserialize)]
pub struct ConfigUpdateRequest {
    pub analyzer_program: Option<String>,
    pub analyzer_args: Option<Vec<String>>,
    pub output_root: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub max_custom_prompt_chars: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub summarize_features: Option<bool>,
    pub key_file_excerpt_chars: Option<usize>,
}

impl ConfigUpdateRequest {
    fn apply(self, config: &mut AppConfig) {
        if let Some(program) = self.analyzer_program {
            config.analyzer.program = program;
        }
        if let Some(args) = self.analyzer_args {
            config.analyzer.args = args;
        }
        if let Some(output_root) = self.output_root {
            config.analyzer.output_root = output_root;
        }
        if let Some(concurrency) = self.concurrency {
            config.generation.concurrency = concurrency;
        }
        if let Some(max) = self.max_custom_prompt_chars {
            config.generation.max_custom_prompt_chars = max;
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.generation.request_timeout_secs = timeout;
        }
        if let Some(summarize) = self.summarize_features {
            config.generation.summarize_features = summarize;
        }
        if let Some(chars) = self.key_file_excerpt_chars {
            config.generation.key_file_excerpt_chars = chars;
        }
    }
}

/// 配置更新响应
#[derive(Serialize)]
pub struct ConfigUpdateResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<String>,
}

/// 连接测试请求
#[derive(Deserialize)]
pub struct TestConnectionRequest {
    pub backend: String,
    #[serde(default)]
    pub api_key: String,
}

/// 连接测试响应
#[derive(Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub backend: String,
}

/// 获取当前配置
async fn get_config_handler() -> Json<ConfigResponse> {
    Json(ConfigResponse::from(get_config()))
}

/// 更新配置
async fn update_config_handler(
    Json(req): Json<ConfigUpdateRequest>,
) -> AppResult<Json<ConfigUpdateResponse>> {
    if req.concurrency == Some(0) {
        return Err(AppError::BadRequest("concurrency must be at least 1".to_string()));
    }

    update_config(|config| req.apply(config))?;

    Ok(Json(ConfigUpdateResponse {
        success: true,
        message: "Config updated successfully".to_string(),
    }))
}

/// 从配置文件重新加载
async fn reload_config_handler() -> AppResult<Json<ConfigUpdateResponse>> {
    if !reload_config() {
        return Err(AppError::Config("配置文件不存在或格式错误".to_string()));
    }
    Ok(Json(ConfigUpdateResponse {
        success: true,
        message: "Config reloaded".to_string(),
    }))
}

/// 列出可用后端
async fn list_backends_handler() -> Json<BackendsResponse> {
    let backends = get_config().backends.into_iter().map(|b| b.name).collect();
    Json(BackendsResponse { backends })
}

/// 用一次最小调用测试后端；密钥原样传给后端，缺失时由后端报告鉴权失败
async fn check_connection(
    registry: &BackendRegistry,
    req: TestConnectionRequest,
) -> AppResult<TestConnectionResponse> {
    registry.call(&req.backend, "Hi", &req.api_key).await?;

    Ok(TestConnectionResponse {
        success: true,
        message: "Connection successful".to_string(),
        backend: req.backend,
    })
}

/// 测试后端连接和密钥
async fn test_connection_handler(
    Json(req): Json<TestConnectionRequest>,
) -> AppResult<Json<TestConnectionResponse>> {
    let registry = BackendRegistry::from_profiles(&get_config().backends, TEST_TIMEOUT)
        .map_err(|e| AppError::Internal(format!("创建后端客户端失败: {}", e)))?;

    Ok(Json(check_connection(&registry, req).await?))
}

/// 创建配置路由
pub fn config_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/config", get(get_config_handler).put(update_config_handler))
        .route("/api/config/reload", post(reload_config_handler))
        .route("/api/backends", get(list_backends_handler))
        .route("/api/backends/test", post(test_connection_handler))
}
