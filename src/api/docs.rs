//! 文档生成 API 端点
//!
//! 提供文档生成运行的 REST API 和 WebSocket 接口

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::get_config;
use crate::error::{AppError, AppResult};
use crate::services::doc_generator::{GenerationConfig, Pipeline, PipelineEvent};
use crate::state::{AppState, RunSnapshot, RunState};

/// 创建文档生成路由
pub fn docs_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/docs/generate", post(generate_docs))
        .route("/api/docs/runs/:id", get(get_run_status).delete(discard_run))
        .route("/ws/docs/:id", get(ws_handler))
}

/// 启动生成响应
#[derive(Debug, Serialize)]
pub struct GenerateDocsResponse {
    /// 运行 ID
    pub run_id: String,
}

/// 启动文档生成
///
/// 配置在启动前校验，校验失败直接返回错误，不创建运行
async fn generate_docs(
    State(state): State<Arc<AppState>>,
    Json(config): Json<GenerationConfig>,
) -> AppResult<Json<GenerateDocsResponse>> {
    info!(
        "Received document generation request: backend={}, project_dir={}",
        config.backend,
        config.project_dir.display()
    );

    let app_config = get_config();
    let retention = Duration::from_secs(app_config.server.run_retention_secs);
    let pipeline = Pipeline::from_config(&app_config)?;
    pipeline.validate(&config)?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let run = Arc::new(RunState::new(&run_id, &config.backend));
    state.runs.insert(run_id.clone(), run.clone());

    // 转发流水线事件：记录历史并广播，结束后按保留期清理
    let mut events = pipeline.run(config);
    let forward_id = run_id.clone();
    let forward_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            run.record(event);
        }
        info!("Run {} event forwarding ended", forward_id);
        forward_state.schedule_eviction(forward_id, retention);
    });

    Ok(Json(GenerateDocsResponse { run_id }))
}

/// 获取运行状态
async fn get_run_status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> AppResult<Json<RunSnapshot>> {
    let run = state
        .runs
        .get(&run_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("Run not found: {}", run_id)))?;

    Ok(Json(run.snapshot()))
}

/// 放弃运行
///
/// 仅移除记录，后台正在进行的调用不会被中断，其结果被丢弃
async fn discard_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let (_, run) = state
        .runs
        .remove(&run_id)
        .ok_or_else(|| AppError::NotFound(format!("Run not found: {}", run_id)))?;

    info!("Run discarded: {} (finished: {})", run_id, run.is_finished());

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Run discarded"
    })))
}

/// WebSocket 进度推送处理器
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, run_id))
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &PipelineEvent,
) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json)).await.is_ok()
}

/// 处理 WebSocket 连接：先重放已记录的事件，再推送后续事件，终止事件后关闭
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>, run_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let run = match state.runs.get(&run_id).map(|entry| entry.value().clone()) {
        Some(run) => run,
        None => {
            let body = serde_json::json!({
                "type": "failed",
                "error": { "kind": "not_found", "message": format!("Run not found: {}", run_id) }
            });
            let _ = sender.send(Message::Text(body.to_string())).await;
            return;
        }
    };

    info!("WebSocket connection established: run_id={}", run_id);

    let (history, mut rx) = run.subscribe();
    info!("Replaying {} events for run {}", history.len(), run_id);
    for event in &history {
        if !send_event(&mut sender, event).await {
            return;
        }
        if event.is_terminal() {
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut sender, &event).await {
                            break;
                        }
                        if event.is_terminal() {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket for run {} lagged, skipped {} events", run_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // 处理客户端消息（主要是 ping/pong）
            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed: run_id={}", run_id);
}
