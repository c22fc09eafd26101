//! 文档生成流水线类型定义
//!
//! 定义生成配置、语义特征、Prompt 集合、生成结果、进度事件等核心类型

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// 文档内容模块
///
/// 声明顺序即文档中的固定展示顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentModule {
    /// 全局介绍
    GlobalIntro,
    /// 模块介绍
    ModuleIntro,
    /// 安装说明
    Installation,
    /// 前置条件
    Prerequisites,
    /// 使用场景
    UseCases,
    /// 调试建议
    DebugSuggestions,
    /// 许可证
    License,
}

impl ContentModule {
    /// 所有模块（按展示顺序）
    pub const ALL: [ContentModule; 7] = [
        ContentModule::GlobalIntro,
        ContentModule::ModuleIntro,
        ContentModule::Installation,
        ContentModule::Prerequisites,
        ContentModule::UseCases,
        ContentModule::DebugSuggestions,
        ContentModule::License,
    ];

    /// 模块标识
    pub fn key(&self) -> &'static str {
        match self {
            ContentModule::GlobalIntro => "global_intro",
            ContentModule::ModuleIntro => "module_intro",
            ContentModule::Installation => "installation",
            ContentModule::Prerequisites => "prerequisites",
            ContentModule::UseCases => "use_cases",
            ContentModule::DebugSuggestions => "debug_suggestions",
            ContentModule::License => "license",
        }
    }

    /// 章节标题
    pub fn title(&self) -> &'static str {
        match self {
            ContentModule::GlobalIntro => "Global Introduction",
            ContentModule::ModuleIntro => "Module Introduction",
            ContentModule::Installation => "Installation",
            ContentModule::Prerequisites => "Prerequisites",
            ContentModule::UseCases => "Use Cases",
            ContentModule::DebugSuggestions => "Debug Suggestions",
            ContentModule::License => "License",
        }
    }
}

impl fmt::Display for ContentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 篇幅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocLength {
    Minimal,
    #[default]
    Normal,
    Detailed,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFormat {
    #[serde(alias = "default")]
    Plain,
    #[default]
    Markdown,
    Latex,
}

/// 行文风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocTone {
    Academic,
    #[default]
    Engineering,
    #[serde(alias = "beginner")]
    BeginnerFriendly,
}

/// 文档风格配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleOptions {
    #[serde(default)]
    pub length: DocLength,
    #[serde(default)]
    pub format: DocFormat,
    #[serde(default)]
    pub tone: DocTone,
}

/// 一次生成任务的配置
///
/// 任务开始后不可变（流水线持有 `Arc<GenerationConfig>`）
#[derive(Clone, Deserialize)]
pub struct GenerationConfig {
    /// 后端名称
    pub backend: String,
    /// API 密钥（原样透传给后端）
    #[serde(default)]
    pub api_key: String,
    /// 项目根目录
    pub project_dir: PathBuf,
    /// 关键文件（可选，保持顺序）
    #[serde(default)]
    pub key_files: Vec<PathBuf>,
    /// 启用的内容模块
    ///
    /// 接受列表 `["global_intro"]` 或勾选表 `{"global_intro": true}`
    #[serde(default, deserialize_with = "deserialize_content_options")]
    pub content_options: BTreeSet<ContentModule>,
    /// 风格配置
    #[serde(flatten)]
    pub style: StyleOptions,
    /// 自定义 Prompt 片段
    #[serde(default)]
    pub custom_prompt: String,
}

impl GenerationConfig {
    /// 创建配置（其余字段取默认值）
    pub fn new(backend: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: backend.into(),
            api_key: String::new(),
            project_dir: project_dir.into(),
            key_files: Vec::new(),
            content_options: BTreeSet::new(),
            style: StyleOptions::default(),
            custom_prompt: String::new(),
        }
    }

    pub fn with_modules(mut self, modules: impl IntoIterator<Item = ContentModule>) -> Self {
        self.content_options = modules.into_iter().collect();
        self
    }

    pub fn with_style(mut self, style: StyleOptions) -> Self {
        self.style = style;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_custom_prompt(mut self, custom_prompt: impl Into<String>) -> Self {
        self.custom_prompt = custom_prompt.into();
        self
    }

    #[cfg(test)]
    pub fn with_key_files(mut self, key_files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.key_files = key_files.into_iter().collect();
        self
    }

    /// 基本字段校验（后端是否注册、Prompt 长度由流水线另行检查）
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.backend.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("backend name is empty".to_string()));
        }
        if self.project_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig("project_dir is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("backend", &self.backend)
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("project_dir", &self.project_dir)
            .field("key_files", &self.key_files)
            .field("content_options", &self.content_options)
            .field("style", &self.style)
            .field("custom_prompt_chars", &self.custom_prompt.chars().count())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentOptionsRepr {
    List(Vec<ContentModule>),
    Flags(BTreeMap<ContentModule, bool>),
}

fn deserialize_content_options<'de, D>(deserializer: D) -> Result<BTreeSet<ContentModule>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ContentOptionsRepr::deserialize(deserializer)? {
        ContentOptionsRepr::List(list) => list.into_iter().collect(),
        ContentOptionsRepr::Flags(flags) => flags
            .into_iter()
            .filter_map(|(module, enabled)| enabled.then_some(module))
            .collect(),
    })
}

/// 结构化产物句柄
///
/// 由代码载入阶段产生，只由特征提炼阶段解读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralArtifactHandle {
    location: PathBuf,
}

impl StructuralArtifactHandle {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }
}

/// 单个模块的语义特征
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleFeatures {
    /// 结构化事实（每行一条）
    pub facts: Vec<String>,
    /// LLM 摘要
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// 摘要失败原因（此时仅保留结构化事实）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl ModuleFeatures {
    pub fn from_facts(facts: Vec<String>) -> Self {
        Self {
            facts,
            summary: None,
            degraded: None,
        }
    }
}

/// 语义特征集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SemanticFeatureSet {
    /// 项目名称
    pub project_name: String,
    /// 模块 -> 特征
    pub modules: BTreeMap<ContentModule, ModuleFeatures>,
}

impl SemanticFeatureSet {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            modules: BTreeMap::new(),
        }
    }

    pub fn get(&self, module: ContentModule) -> Option<&ModuleFeatures> {
        self.modules.get(&module)
    }

    pub fn insert(&mut self, module: ContentModule, features: ModuleFeatures) {
        self.modules.insert(module, features);
    }

    /// 摘要降级的模块
    pub fn degraded(&self) -> impl Iterator<Item = (ContentModule, &str)> {
        self.modules
            .iter()
            .filter_map(|(module, f)| f.degraded.as_deref().map(|reason| (*module, reason)))
    }
}

/// 每个启用模块对应一条 Prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSet {
    prompts: BTreeMap<ContentModule, String>,
}

impl PromptSet {
    pub fn insert(&mut self, module: ContentModule, prompt: String) {
        self.prompts.insert(module, prompt);
    }

    #[cfg(test)]
    pub fn get(&self, module: ContentModule) -> Option<&str> {
        self.prompts.get(&module).map(String::as_str)
    }

    /// 按固定模块顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (ContentModule, &str)> {
        self.prompts.iter().map(|(m, p)| (*m, p.as_str()))
    }

    #[cfg(test)]
    pub fn modules(&self) -> Vec<ContentModule> {
        self.prompts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

/// 章节生成状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionStatus {
    Ok,
    Failed { error: String },
}

/// 文档章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub module: ContentModule,
    pub title: String,
    pub body: String,
    pub status: SectionStatus,
}

impl DocumentSection {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, SectionStatus::Failed { .. })
    }
}

/// 最终文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    /// 项目名称
    pub project_name: String,
    /// 输出格式
    pub format: DocFormat,
    /// 生成时间
    pub generated_at: String,
    /// 章节（固定模块顺序）
    pub sections: Vec<DocumentSection>,
}

impl GeneratedDocument {
    #[cfg(test)]
    pub fn modules(&self) -> Vec<ContentModule> {
        self.sections.iter().map(|s| s.module).collect()
    }

    #[cfg(test)]
    pub fn section(&self, module: ContentModule) -> Option<&DocumentSection> {
        self.sections.iter().find(|s| s.module == module)
    }

    pub fn failed_modules(&self) -> Vec<ContentModule> {
        self.sections
            .iter()
            .filter(|s| s.is_failed())
            .map(|s| s.module)
            .collect()
    }

    /// 拼接为完整文本（用于预览）
    pub fn assemble(&self) -> String {
        let mut parts = Vec::with_capacity(self.sections.len() + 1);

        match self.format {
            DocFormat::Markdown => parts.push(format!("# {}", self.project_name)),
            DocFormat::Latex => parts.push(format!("\\title{{{}}}\n\\maketitle", self.project_name)),
            DocFormat::Plain => {
                parts.push(format!("{}\n{}", self.project_name, "=".repeat(self.project_name.chars().count())))
            }
        }

        for section in &self.sections {
            let heading = match self.format {
                DocFormat::Markdown => format!("## {}", section.title),
                DocFormat::Latex => format!("\\section{{{}}}", section.title),
                DocFormat::Plain => format!("{}\n{}", section.title, "-".repeat(section.title.chars().count())),
            };
            parts.push(format!("{}\n\n{}", heading, section.body.trim()));
        }

        parts.join("\n\n")
    }
}

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Loading,
    Extracting,
    Prompting,
    Generating,
    Done,
    Failed,
}

impl PipelineState {
    /// 是否允许从当前状态迁移到 `next`
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Extracting)
                | (Extracting, Prompting)
                | (Prompting, Generating)
                | (Generating, Done)
                | (Idle | Loading | Extracting | Prompting | Generating, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Extract,
    Prompt,
    Generate,
}

impl Stage {
    /// 阶段序号（1-4）
    pub fn index(&self) -> u8 {
        match self {
            Stage::Load => 1,
            Stage::Extract => 2,
            Stage::Prompt => 3,
            Stage::Generate => 4,
        }
    }

    /// 阶段完成后的进度百分比
    pub fn percent(&self) -> u8 {
        self.index() * 25
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Load => "Loading source code",
            Stage::Extract => "Extracting semantic features",
            Stage::Prompt => "Building prompts",
            Stage::Generate => "Generating document",
        }
    }

    /// 阶段执行期间的状态
    pub fn state(&self) -> PipelineState {
        match self {
            Stage::Load => PipelineState::Loading,
            Stage::Extract => PipelineState::Extracting,
            Stage::Prompt => PipelineState::Prompting,
            Stage::Generate => PipelineState::Generating,
        }
    }
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: u8,
    pub percent: u8,
    pub label: String,
}

impl ProgressEvent {
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            stage: stage.index(),
            percent: stage.percent(),
            label: stage.label().to_string(),
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// 日志事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

/// 终止错误（随 Failed 事件发出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    /// 错误类别，如 `analysis_failed`
    pub kind: String,
    pub message: String,
}

impl From<&PipelineError> for FatalError {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// 流水线事件
///
/// 每次运行以且仅以一个 `Completed` 或 `Failed` 结束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Log(LogEvent),
    Completed { document: GeneratedDocument },
    Failed { error: FatalError },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Completed { .. } | PipelineEvent::Failed { .. })
    }
}

/// 流水线错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Unsupported backend: {name}")]
    UnsupportedBackend { name: String },

    #[error("[{provider} API Error] {message}")]
    Backend { provider: String, message: String },

    #[error("Static analysis failed: {stderr}")]
    AnalysisFailed { stderr: String },

    #[error("Structural artifact unreadable at {path}: {reason}")]
    ArtifactUnreadable { path: PathBuf, reason: String },

    #[error("Custom prompt too long: {length} characters (max {max})")]
    PromptTooLong { length: usize, max: usize },

    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// 错误类别标识
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedBackend { .. } => "unsupported_backend",
            PipelineError::Backend { .. } => "backend_error",
            PipelineError::AnalysisFailed { .. } => "analysis_failed",
            PipelineError::ArtifactUnreadable { .. } => "artifact_unreadable",
            PipelineError::PromptTooLong { .. } => "prompt_too_long",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_options_accepts_list_and_flags() {
        let from_list: GenerationConfig = serde_json::from_str(
            r#"{"backend": "qwen", "project_dir": "/tmp/demo", "content_options": ["license", "global_intro"]}"#,
        )
        .unwrap();
        assert_eq!(
            from_list.content_options.iter().copied().collect::<Vec<_>>(),
            vec![ContentModule::GlobalIntro, ContentModule::License]
        );

        let from_flags: GenerationConfig = serde_json::from_str(
            r#"{"backend": "qwen", "project_dir": "/tmp/demo",
                "content_options": {"installation": true, "license": false, "use_cases": true}}"#,
        )
        .unwrap();
        assert_eq!(
            from_flags.content_options.iter().copied().collect::<Vec<_>>(),
            vec![ContentModule::Installation, ContentModule::UseCases]
        );
    }

    #[test]
    fn test_style_defaults_and_aliases() {
        let config: GenerationConfig = serde_json::from_str(
            r#"{"backend": "claude", "project_dir": "p", "format": "default", "tone": "beginner"}"#,
        )
        .unwrap();
        assert_eq!(config.style.length, DocLength::Normal);
        assert_eq!(config.style.format, DocFormat::Plain);
        assert_eq!(config.style.tone, DocTone::BeginnerFriendly);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = GenerationConfig::new("chatgpt", "/p").with_api_key("sk-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_state_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Generating.can_transition_to(Done));
        assert!(Extracting.can_transition_to(Failed));
        assert!(!Loading.can_transition_to(Prompting));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Loading));
    }

    #[test]
    fn test_stage_percentages() {
        let percents: Vec<u8> = [Stage::Load, Stage::Extract, Stage::Prompt, Stage::Generate]
            .iter()
            .map(Stage::percent)
            .collect();
        assert_eq!(percents, vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PipelineEvent::Progress(ProgressEvent::for_stage(Stage::Extract));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], 2);
        assert_eq!(json["percent"], 50);
    }

    #[test]
    fn test_assemble_markdown() {
        let document = GeneratedDocument {
            project_name: "demo".to_string(),
            format: DocFormat::Markdown,
            generated_at: String::new(),
            sections: vec![DocumentSection {
                module: ContentModule::Installation,
                title: ContentModule::Installation.title().to_string(),
                body: "Run mvn install.\n".to_string(),
                status: SectionStatus::Ok,
            }],
        };
        assert_eq!(document.assemble(), "# demo\n\n## Installation\n\nRun mvn install.");
    }
}
