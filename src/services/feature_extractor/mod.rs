//! 语义特征提炼
//!
//! 读取分析器产物和关键文件，为每个启用的内容模块整理结构化事实；
//! 部分模块再调用一次 LLM 生成简短摘要，摘要失败只降级、不中断。

mod artifact;
mod facts;
mod key_files;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GenerationSettings;
use crate::services::backend::BackendRegistry;
use crate::services::doc_generator::{
    ContentModule, GenerationConfig, ModuleFeatures, PipelineError, SemanticFeatureSet,
    StructuralArtifactHandle,
};
use facts::FactSource;

/// 需要 LLM 摘要的模块
const SUMMARIZED_MODULES: [ContentModule; 3] = [
    ContentModule::GlobalIntro,
    ContentModule::ModuleIntro,
    ContentModule::UseCases,
];

const SUMMARY_PROMPT: &str = r#"You are reading the structural model of the Java project "{project_name}".
Summarize the facts below for the "{module_title}" part of its documentation in at most three sentences.
Only use what the facts state.

Facts:
{facts}"#;

/// 特征提炼器
#[derive(Clone)]
pub struct FeatureExtractor {
    registry: Arc<BackendRegistry>,
    summarize: bool,
    excerpt_chars: usize,
}

impl FeatureExtractor {
    pub fn new(registry: Arc<BackendRegistry>, settings: &GenerationSettings) -> Self {
        Self {
            registry,
            summarize: settings.summarize_features,
            excerpt_chars: settings.key_file_excerpt_chars,
        }
    }

    /// 关闭 LLM 摘要
    pub fn without_summaries(mut self) -> Self {
        self.summarize = false;
        self
    }

    /// 提炼语义特征
    ///
    /// 即使没有启用任何模块也会读取产物，以便尽早发现分析器输出缺失
    pub async fn extract(
        &self,
        handle: &StructuralArtifactHandle,
        config: &GenerationConfig,
    ) -> Result<SemanticFeatureSet, PipelineError> {
        let location = handle.path().to_path_buf();
        let key_file_paths = config.key_files.clone();
        let excerpt_chars = self.excerpt_chars;

        let (artifact, key_files) = tokio::task::spawn_blocking(move || {
            let artifact = artifact::read_artifact(&location)?;
            let key_files = key_files::read_key_files(&key_file_paths, excerpt_chars);
            Ok::<_, PipelineError>((artifact, key_files))
        })
        .await
        .map_err(|e| PipelineError::ArtifactUnreadable {
            path: handle.path().to_path_buf(),
            reason: format!("reader task failed: {}", e),
        })??;

        let project_name = handle
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(
            "Artifact for {} has {} types, {} key files read",
            project_name,
            artifact.records.len(),
            key_files.len()
        );

        let source = FactSource {
            project_name: &project_name,
            artifact: &artifact,
            key_files: &key_files,
        };

        let mut features = SemanticFeatureSet::new(project_name.as_str());
        for module in config.content_options.iter().copied() {
            let mut module_features = ModuleFeatures::from_facts(source.facts_for(module));

            if self.summarize && SUMMARIZED_MODULES.contains(&module) {
                let prompt = format_summary_prompt(&project_name, module, &module_features.facts);
                match self.registry.call(&config.backend, &prompt, &config.api_key).await {
                    Ok(summary) => module_features.summary = Some(summary),
                    Err(e) => {
                        warn!("Summary for {} degraded: {}", module, e);
                        module_features.degraded = Some(e.to_string());
                    }
                }
            }

            features.insert(module, module_features);
        }

        Ok(features)
    }
}

fn format_summary_prompt(project_name: &str, module: ContentModule, facts: &[String]) -> String {
    SUMMARY_PROMPT
        .replace("{project_name}", project_name)
        .replace("{module_title}", module.title())
        .replace("{facts}", &facts.join("\n"))
}
