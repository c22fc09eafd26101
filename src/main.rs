//! Java Code Documentation Generator - Rust Backend
//!
//! 调用静态分析器和 LLM 为 Java 项目生成说明文档。
//! 可作为 HTTP/WebSocket 服务运行，也可在命令行一次性执行。

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod llm;
mod services;
mod state;

use api::create_api_routes;
use config::{get_config, set_config, AppConfig};
use services::doc_generator::{GenerationConfig, LogLevel, Pipeline, PipelineEvent};
use state::create_shared_state;

#[derive(Parser)]
#[command(name = "docgen-rs")]
#[command(version, about = "Documentation generator for Java projects")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 应用配置文件（默认为可执行文件旁的 config.json）
    #[arg(long, short, global = true, env = config::CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket service
    Serve {
        #[arg(long, help = "Listen address (overrides config)")]
        host: Option<String>,
        #[arg(long, help = "Listen port (overrides config)")]
        port: Option<u16>,
    },

    /// Run one generation from a JSON request file and print the result
    Run {
        /// Generation request (backend, project_dir, content_options, ...)
        request: PathBuf,
        #[arg(long, env = "DOCGEN_API_KEY", hide_env_values = true, help = "API key (overrides the request file)")]
        api_key: Option<String>,
    },
}

/// 在 Windows 上设置控制台代码页为 UTF-8
#[cfg(windows)]
fn setup_console_encoding() {
    unsafe {
        // 设置控制台输出代码页为 UTF-8 (65001)
        extern "system" {
            fn SetConsoleOutputCP(code_page: u32) -> i32;
            fn SetConsoleCP(code_page: u32) -> i32;
        }
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn setup_console_encoding() {
    // 非 Windows 平台不需要特殊处理
}

/// 读取命令行指定的配置文件
fn load_config_file(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))
}

async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let server = get_config().server;
    let host = host.unwrap_or(server.host);
    let port = port.unwrap_or(server.port);

    // 创建共享状态
    let state = create_shared_state();

    // 配置 CORS（允许所有来源）
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建路由
    let app = Router::new()
        .merge(create_api_routes(Arc::clone(&state)))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    info!("Server listening on: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// 命令行一次性运行，失败时返回 false
async fn run_once(request: &Path, api_key: Option<String>) -> anyhow::Result<bool> {
    let content = std::fs::read_to_string(request)
        .with_context(|| format!("failed to read request {}", request.display()))?;
    let mut config: GenerationConfig = serde_json::from_str(&content)
        .with_context(|| format!("invalid request {}", request.display()))?;
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }

    let pipeline = Pipeline::from_config(&get_config())?;
    let mut events = pipeline.run(config);

    let mut succeeded = false;
    while let Some(event) = events.next().await {
        match event {
            PipelineEvent::Progress(progress) => {
                println!("[{:>3}%] {}", progress.percent, progress.label);
            }
            PipelineEvent::Log(log) => {
                let level = match log.level {
                    LogLevel::Info => "info",
                    LogLevel::Warn => "warn",
                    LogLevel::Error => "error",
                };
                eprintln!("{} [{}] {}", log.timestamp, level, log.message);
            }
            PipelineEvent::Completed { document } => {
                let failed = document.failed_modules();
                if !failed.is_empty() {
                    eprintln!("{} of {} sections failed", failed.len(), document.sections.len());
                }
                println!("\n{}", document.assemble());
                succeeded = true;
            }
            PipelineEvent::Failed { error } => {
                eprintln!("Generation failed ({}): {}", error.kind, error.message);
            }
        }
    }

    Ok(succeeded)
}

async fn run_cli(cli: Cli) -> anyhow::Result<bool> {
    // 显式指定的配置文件必须存在
    if let Some(path) = &cli.config {
        set_config(load_config_file(path)?);
    }

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            info!("Starting documentation generator service...");
            serve(host, port).await?;
            Ok(true)
        }
        Commands::Run { request, api_key } => run_once(&request, api_key).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 设置控制台编码
    setup_console_encoding();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgen_rs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run_cli(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["docgen-rs"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_run_subcommand() {
        let cli = Cli::try_parse_from(["docgen-rs", "run", "request.json", "--api-key", "sk-1"]).unwrap();
        match cli.command {
            Some(Commands::Run { request, api_key }) => {
                assert_eq!(request, PathBuf::from("request.json"));
                assert_eq!(api_key.as_deref(), Some("sk-1"));
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[tokio::test]
    async fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let missing = missing.to_str().unwrap();
        let cli =
            Cli::try_parse_from(["docgen-rs", "--config", missing, "run", "request.json"]).unwrap();

        let err = run_cli(cli).await.unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 9000}}"#).unwrap();
        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.backends.len(), 4);
    }
}
