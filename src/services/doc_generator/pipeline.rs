//! 文档生成流水线
//!
//! 载入 → 提炼 → 构建 Prompt → 生成，四个阶段严格顺序执行。
//! 调用方只通过事件流获知进度，每次运行以唯一的 `Completed` 或 `Failed` 事件结束。

use chrono::Local;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use super::generator::DocumentGenerator;
use super::types::{
    FatalError, GeneratedDocument, GenerationConfig, LogEvent, LogLevel, PipelineError,
    PipelineEvent, PipelineState, ProgressEvent, Stage,
};
use crate::config::{AppConfig, GenerationSettings};
use crate::services::backend::BackendRegistry;
use crate::services::code_loader::CodeModelLoader;
use crate::services::feature_extractor::FeatureExtractor;
use crate::services::prompt_builder;

/// 单次运行的事件出口，同时记录状态
struct RunReporter {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    state: PipelineState,
}

impl RunReporter {
    fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self {
            tx,
            state: PipelineState::Idle,
        }
    }

    /// 状态迁移，非法迁移被拒绝
    fn advance(&mut self, next: PipelineState) -> bool {
        if !self.state.can_transition_to(next) {
            error!("Rejected state transition {:?} -> {:?}", self.state, next);
            return false;
        }
        self.state = next;
        true
    }

    fn emit(&self, event: PipelineEvent) {
        // 接收端已丢弃（运行被放弃）时静默忽略
        let _ = self.tx.send(event);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.emit(PipelineEvent::Log(LogEvent {
            level,
            message,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }));
    }

    fn progress(&self, stage: Stage) {
        self.emit(PipelineEvent::Progress(ProgressEvent::for_stage(stage)));
    }

    /// 阶段开始：迁移状态并记日志，进度在阶段成功后由 `progress` 报告
    fn begin(&mut self, stage: Stage) {
        self.advance(stage.state());
        self.log(
            LogLevel::Info,
            format!("Step {}/4: {}...", stage.index(), stage.label()),
        );
    }

    fn complete(mut self, document: GeneratedDocument) {
        self.advance(PipelineState::Done);
        self.emit(PipelineEvent::Completed { document });
    }

    fn fail(mut self, err: &PipelineError) {
        self.log(LogLevel::Error, err.to_string());
        self.advance(PipelineState::Failed);
        self.emit(PipelineEvent::Failed {
            error: FatalError::from(err),
        });
    }
}

/// 文档生成流水线
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<BackendRegistry>,
    loader: CodeModelLoader,
    extractor: FeatureExtractor,
    generator: DocumentGenerator,
    max_custom_prompt_chars: usize,
}

impl Pipeline {
    pub fn new(
        registry: Arc<BackendRegistry>,
        loader: CodeModelLoader,
        settings: &GenerationSettings,
    ) -> Self {
        Self {
            extractor: FeatureExtractor::new(registry.clone(), settings),
            generator: DocumentGenerator::new(registry.clone(), settings.concurrency),
            registry,
            loader,
            max_custom_prompt_chars: settings.max_custom_prompt_chars,
        }
    }

    /// 按应用配置构建（注册配置中的全部后端）
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let timeout = Duration::from_secs(config.generation.request_timeout_secs);
        let registry = BackendRegistry::from_profiles(&config.backends, timeout).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to build backend clients: {}", e))
        })?;

        Ok(Self::new(
            Arc::new(registry),
            CodeModelLoader::from_config(&config.analyzer),
            &config.generation,
        ))
    }

    pub fn backend_names(&self) -> &[String] {
        self.registry.names()
    }

    /// 启动前校验：字段完整、后端已注册、自定义 Prompt 不超长
    pub fn validate(&self, config: &GenerationConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.registry.get(&config.backend)?;
        prompt_builder::check_custom_prompt(&config.custom_prompt, self.max_custom_prompt_chars)
    }

    /// 在后台任务中运行，返回事件流
    ///
    /// 阶段内的 panic 被捕获并转成 `Failed` 事件，事件流总以一个终止事件结束
    pub fn run(&self, config: GenerationConfig) -> UnboundedReceiverStream<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = self.clone();

        tokio::spawn(async move {
            let mut reporter = RunReporter::new(tx);
            let outcome = AssertUnwindSafe(pipeline.execute(&config, &mut reporter))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(document)) => reporter.complete(document),
                Ok(Err(e)) => reporter.fail(&e),
                Err(payload) => reporter.fail(&PipelineError::Internal(panic_message(&*payload))),
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    async fn execute(
        &self,
        config: &GenerationConfig,
        reporter: &mut RunReporter,
    ) -> Result<GeneratedDocument, PipelineError> {
        info!("Starting documentation run: {:?}", config);
        self.validate(config)?;

        reporter.begin(Stage::Load);
        let handle = self.loader.load(&config.project_dir).await?;
        reporter.progress(Stage::Load);

        reporter.begin(Stage::Extract);
        let features = self.extractor.extract(&handle, config).await?;
        reporter.progress(Stage::Extract);
        for (module, reason) in features.degraded() {
            reporter.log(
                LogLevel::Warn,
                format!("Feature summary for {} unavailable, using structural facts: {}", module, reason),
            );
        }

        reporter.begin(Stage::Prompt);
        let prompts = prompt_builder::build(&features, config, self.max_custom_prompt_chars)?;
        reporter.progress(Stage::Prompt);
        if prompts.is_empty() {
            reporter.log(LogLevel::Info, "No content modules enabled, document will be empty");
        }

        reporter.begin(Stage::Generate);
        let document = self
            .generator
            .generate(&features.project_name, &prompts, config)
            .await;
        reporter.progress(Stage::Generate);
        for section in document.sections.iter().filter(|s| s.is_failed()) {
            reporter.log(
                LogLevel::Warn,
                format!("Section {} could not be generated: {}", section.module, section.body),
            );
        }

        Ok(document)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("run aborted by a panic: {}", detail)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::backend::testing::{registry_with, ScriptedBackend};
    use crate::services::doc_generator::ContentModule;
    use futures::StreamExt;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        backend: Arc<ScriptedBackend>,
    }

    impl Fixture {
        fn new(backend: ScriptedBackend) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let artifact = dir.path().join("output").join("shop");
            fs::create_dir_all(&artifact).unwrap();
            fs::write(
                artifact.join("types.json"),
                r#"[{"name": "App", "package": "shop", "modifiers": ["public"],
                     "methods": [{"name": "main", "modifiers": ["public", "static"]}],
                     "dependencies": ["org.slf4j.Logger"]}]"#,
            )
            .unwrap();
            Self {
                dir,
                backend: Arc::new(backend),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn pipeline_with(&self, loader: CodeModelLoader) -> Pipeline {
            Pipeline::new(
                Arc::new(registry_with(self.backend.clone())),
                loader,
                &GenerationSettings::default(),
            )
        }

        /// 分析器什么也不做，产物已预先写好
        fn pipeline(&self) -> Pipeline {
            self.pipeline_with(CodeModelLoader::new("true", self.root().join("output")))
        }

        fn config(&self, modules: &[ContentModule]) -> GenerationConfig {
            GenerationConfig::new(self.backend_name(), self.root().join("shop"))
                .with_api_key("sk-test")
                .with_modules(modules.iter().copied())
        }

        fn backend_name(&self) -> String {
            use crate::services::backend::LlmBackend;
            self.backend.name().to_string()
        }
    }

    fn progress(events: &[PipelineEvent]) -> Vec<(u8, u8)> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress(p) => Some((p.stage, p.percent)),
                _ => None,
            })
            .collect()
    }

    fn assert_single_terminal(events: &[PipelineEvent]) {
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    fn fatal(events: &[PipelineEvent]) -> &FatalError {
        match events.last().unwrap() {
            PipelineEvent::Failed { error } => error,
            other => panic!("expected failure, got {:?}", other),
        }
    }

    fn document(events: &[PipelineEvent]) -> &GeneratedDocument {
        match events.last().unwrap() {
            PipelineEvent::Completed { document } => document,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_two_modules() {
        let fixture = Fixture::new(ScriptedBackend::new("provider-a"));
        let config = fixture.config(&[ContentModule::Installation, ContentModule::GlobalIntro]);

        let events: Vec<PipelineEvent> = fixture.pipeline().run(config).collect().await;

        assert_eq!(progress(&events), vec![(1, 25), (2, 50), (3, 75), (4, 100)]);
        assert_single_terminal(&events);

        let document = document(&events);
        assert_eq!(document.project_name, "shop");
        assert_eq!(
            document.modules(),
            vec![ContentModule::GlobalIntro, ContentModule::Installation]
        );
        assert!(document.failed_modules().is_empty());
        assert!(document.sections[1]
            .body
            .starts_with("generated: Write the \"Installation\" section"));

        // 每次调用都带上同一个密钥
        assert!(fixture.backend.calls.lock().iter().all(|(_, key)| key == "sk-test"));
    }

    #[tokio::test]
    async fn test_log_precedes_progress_for_each_stage() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let events: Vec<PipelineEvent> = fixture
            .pipeline()
            .run(fixture.config(&[ContentModule::License]))
            .collect()
            .await;

        let first_log = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::Log(_)))
            .unwrap();
        let first_progress = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::Progress(_)))
            .unwrap();
        assert!(first_log < first_progress);
    }

    #[tokio::test]
    async fn test_zero_modules_completes_empty() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let events: Vec<PipelineEvent> = fixture.pipeline().run(fixture.config(&[])).collect().await;

        assert_eq!(progress(&events).len(), 4);
        assert!(document(&events).sections.is_empty());
        assert_eq!(fixture.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_section_failure_keeps_run_alive() {
        let fixture =
            Fixture::new(ScriptedBackend::new("qwen").failing_on("Write the \"Installation\" section"));
        let config = fixture.config(&[
            ContentModule::GlobalIntro,
            ContentModule::Installation,
            ContentModule::License,
        ]);

        let events: Vec<PipelineEvent> = fixture.pipeline().run(config).collect().await;

        assert_single_terminal(&events);
        let document = document(&events);
        assert_eq!(document.sections.len(), 3);
        assert_eq!(document.failed_modules(), vec![ContentModule::Installation]);
        assert!(document.sections[1].body.starts_with("[qwen API Error]"));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Log(LogEvent { level: LogLevel::Warn, .. })
        )));
    }

    #[tokio::test]
    async fn test_backend_panic_ends_with_failed_event() {
        let fixture = Fixture::new(ScriptedBackend::new("boom").panicking_on("\"License\" section"));
        let config = fixture.config(&[ContentModule::License]);

        let events: Vec<PipelineEvent> = fixture.pipeline().run(config).collect().await;

        assert_single_terminal(&events);
        assert_eq!(progress(&events), vec![(1, 25), (2, 50), (3, 75)]);
        let error = fatal(&events);
        assert_eq!(error.kind, "internal");
        assert!(error.message.contains("scripted backend crashed"));
    }

    #[tokio::test]
    async fn test_analyzer_failure_emits_no_progress() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let loader = CodeModelLoader::new("sh", fixture.root().join("output"))
            .args(["-c", "echo 'cannot parse project' >&2; exit 1", "analyzer"]);
        let config = fixture.config(&[ContentModule::GlobalIntro]);

        let events: Vec<PipelineEvent> = fixture.pipeline_with(loader).run(config).collect().await;

        assert!(progress(&events).is_empty());
        assert_single_terminal(&events);
        let error = fatal(&events);
        assert_eq!(error.kind, "analysis_failed");
        assert!(error.message.contains("cannot parse project"));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Log(LogEvent { level: LogLevel::Error, .. })
        )));
        assert_eq!(fixture.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_after_loading() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let loader = CodeModelLoader::new("true", fixture.root().join("elsewhere"));

        let events: Vec<PipelineEvent> = fixture
            .pipeline_with(loader)
            .run(fixture.config(&[ContentModule::GlobalIntro]))
            .collect()
            .await;

        assert_eq!(progress(&events), vec![(1, 25)]);
        assert_eq!(fatal(&events).kind, "artifact_unreadable");
    }

    #[tokio::test]
    async fn test_unsupported_backend_fails_before_loading() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let config = GenerationConfig::new("gemini", fixture.root().join("shop"))
            .with_modules([ContentModule::GlobalIntro]);

        let events: Vec<PipelineEvent> = fixture.pipeline().run(config).collect().await;

        assert!(progress(&events).is_empty());
        assert_eq!(fatal(&events).kind, "unsupported_backend");
        assert_eq!(fatal(&events).message, "Unsupported backend: gemini");
    }

    #[tokio::test]
    async fn test_custom_prompt_bound() {
        let fixture = Fixture::new(ScriptedBackend::new("mock"));
        let pipeline = fixture.pipeline();

        let ok = fixture
            .config(&[ContentModule::License])
            .with_custom_prompt("a".repeat(500));
        let events: Vec<PipelineEvent> = pipeline.run(ok).collect().await;
        assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));

        let too_long = fixture
            .config(&[ContentModule::License])
            .with_custom_prompt("a".repeat(501));
        let events: Vec<PipelineEvent> = pipeline.run(too_long).collect().await;
        assert!(progress(&events).is_empty());
        assert_eq!(fatal(&events).kind, "prompt_too_long");
    }

    #[test]
    fn test_from_default_config_registers_all_backends() {
        let pipeline = Pipeline::from_config(&AppConfig::default()).unwrap();
        assert_eq!(pipeline.backend_names().len(), 4);
        assert!(pipeline
            .validate(&GenerationConfig::new("Claude", "/p/shop"))
            .is_ok());
    }
}
