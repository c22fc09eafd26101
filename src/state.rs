//! 应用状态管理
//!
//! 定义在请求处理器之间共享的状态。

use chrono::Local;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::services::doc_generator::{
    FatalError, GeneratedDocument, PipelineEvent, PipelineState, ProgressEvent,
};

/// 广播通道容量
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// 运行状态快照（供状态查询接口返回）
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: String,
    pub backend: String,
    pub state: PipelineState,
    /// 最近完成的阶段（0 表示尚未完成任何阶段）
    pub stage: u8,
    pub percent: u8,
    pub label: Option<String>,
    pub last_log: Option<String>,
    pub error: Option<FatalError>,
    pub document: Option<GeneratedDocument>,
    pub started_at: String,
}

impl RunSnapshot {
    fn new(id: &str, backend: &str) -> Self {
        Self {
            id: id.to_string(),
            backend: backend.to_string(),
            state: PipelineState::Loading,
            stage: 0,
            percent: 0,
            label: None,
            last_log: None,
            error: None,
            document: None,
            started_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Progress(ProgressEvent {
                stage,
                percent,
                label,
            }) => {
                self.stage = *stage;
                self.percent = *percent;
                self.label = Some(label.clone());
                self.state = match stage {
                    1 => PipelineState::Extracting,
                    2 => PipelineState::Prompting,
                    _ => PipelineState::Generating,
                };
            }
            PipelineEvent::Log(log) => self.last_log = Some(log.message.clone()),
            PipelineEvent::Completed { document } => {
                self.state = PipelineState::Done;
                self.document = Some(document.clone());
            }
            PipelineEvent::Failed { error } => {
                self.state = PipelineState::Failed;
                self.error = Some(error.clone());
            }
        }
    }
}

struct RunRecord {
    history: Vec<PipelineEvent>,
    snapshot: RunSnapshot,
}

/// 单次运行的状态：历史事件、广播通道和快照
///
/// 历史与广播在同一把锁下更新，WebSocket 重放后订阅不会漏掉或重复事件
pub struct RunState {
    tx: broadcast::Sender<PipelineEvent>,
    record: RwLock<RunRecord>,
}

impl RunState {
    pub fn new(id: &str, backend: &str) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            record: RwLock::new(RunRecord {
                history: Vec::new(),
                snapshot: RunSnapshot::new(id, backend),
            }),
        }
    }

    /// 记录事件并转发给当前订阅者
    pub fn record(&self, event: PipelineEvent) {
        let mut record = self.record.write();
        record.snapshot.apply(&event);
        record.history.push(event.clone());
        // 没有订阅者时 send 失败，忽略
        let _ = self.tx.send(event);
    }

    /// 已记录的事件，以及从此刻起的订阅
    pub fn subscribe(&self) -> (Vec<PipelineEvent>, broadcast::Receiver<PipelineEvent>) {
        let record = self.record.read();
        (record.history.clone(), self.tx.subscribe())
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.record.read().snapshot.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.record.read().snapshot.state.is_terminal()
    }
}

/// 运行注册表
pub type RunRegistry = DashMap<String, Arc<RunState>>;

/// 应用共享状态
///
/// 使用 Arc 包裹以便在多个处理器之间安全共享
#[derive(Clone)]
pub struct AppState {
    /// 文档生成运行注册表
    pub runs: Arc<RunRegistry>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new() -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
        }
    }

    /// 保留期过后移除已结束的运行；届时仍未结束的运行保持不动
    pub fn schedule_eviction(&self, run_id: String, retention: Duration) {
        let runs = Arc::clone(&self.runs);
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if runs.remove_if(&run_id, |_, run| run.is_finished()).is_some() {
                debug!("Evicted finished run {}", run_id);
            }
        });
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// 创建可共享的应用状态
pub fn create_shared_state() -> Arc<AppState> {
    Arc::new(AppState::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::doc_generator::{LogEvent, LogLevel, Stage};

    fn log(message: &str) -> PipelineEvent {
        PipelineEvent::Log(LogEvent {
            level: LogLevel::Info,
            message: message.to_string(),
            timestamp: String::new(),
        })
    }

    #[tokio::test]
    async fn test_replay_then_live_events() {
        let run = RunState::new("run-1", "qwen");
        run.record(log("Step 1/4"));
        run.record(PipelineEvent::Progress(ProgressEvent::for_stage(Stage::Load)));

        let (history, mut rx) = run.subscribe();
        assert_eq!(history.len(), 2);

        run.record(PipelineEvent::Progress(ProgressEvent::for_stage(Stage::Extract)));
        match rx.recv().await.unwrap() {
            PipelineEvent::Progress(p) => assert_eq!(p.percent, 50),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finished_runs_are_evicted_after_retention() {
        let state = AppState::new();
        let done = Arc::new(RunState::new("done", "qwen"));
        done.record(PipelineEvent::Failed {
            error: FatalError {
                kind: "analysis_failed".to_string(),
                message: "exit 1".to_string(),
            },
        });
        state.runs.insert("done".to_string(), done);
        state
            .runs
            .insert("running".to_string(), Arc::new(RunState::new("running", "qwen")));

        state.schedule_eviction("done".to_string(), Duration::from_millis(10));
        state.schedule_eviction("running".to_string(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!state.runs.contains_key("done"));
        assert!(state.runs.contains_key("running"));
    }

    #[test]
    fn test_snapshot_tracks_progress_and_failure() {
        let run = RunState::new("run-2", "claude");
        assert_eq!(run.snapshot().state, PipelineState::Loading);

        run.record(PipelineEvent::Progress(ProgressEvent::for_stage(Stage::Load)));
        let snapshot = run.snapshot();
        assert_eq!(snapshot.state, PipelineState::Extracting);
        assert_eq!(snapshot.percent, 25);
        assert_eq!(snapshot.label.as_deref(), Some("Loading source code"));

        run.record(PipelineEvent::Failed {
            error: FatalError {
                kind: "artifact_unreadable".to_string(),
                message: "missing".to_string(),
            },
        });
        assert!(run.is_finished());
        assert_eq!(run.snapshot().error.unwrap().kind, "artifact_unreadable");
    }
}
