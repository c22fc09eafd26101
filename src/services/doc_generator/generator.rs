//! 文档生成器
//!
//! 每条 Prompt 调用一次后端，结果按模块固定顺序组装成文档

use chrono::Local;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{
    ContentModule, DocumentSection, GeneratedDocument, GenerationConfig, PromptSet, SectionStatus,
};
use crate::services::backend::BackendRegistry;

/// 并发上限
pub const MAX_CONCURRENCY: usize = 10;

/// 文档生成器
#[derive(Clone)]
pub struct DocumentGenerator {
    registry: Arc<BackendRegistry>,
    /// 同时进行的后端调用数
    concurrency: usize,
}

impl DocumentGenerator {
    /// 创建新的文档生成器（并发数限制在 1-10）
    pub fn new(registry: Arc<BackendRegistry>, concurrency: usize) -> Self {
        Self {
            registry,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    #[cfg(test)]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 生成单个章节，失败时以错误信息占位
    async fn generate_section(
        &self,
        module: ContentModule,
        prompt: &str,
        config: &GenerationConfig,
    ) -> DocumentSection {
        debug!("Generating section {} ({} chars prompt)", module, prompt.chars().count());

        let (body, status) = match self.registry.call(&config.backend, prompt, &config.api_key).await {
            Ok(text) => (text, SectionStatus::Ok),
            Err(e) => {
                warn!("Section {} failed: {}", module, e);
                let message = e.to_string();
                (message.clone(), SectionStatus::Failed { error: message })
            }
        };

        DocumentSection {
            module,
            title: module.title().to_string(),
            body,
            status,
        }
    }

    /// 生成整篇文档
    ///
    /// 单个章节失败不影响其他章节；返回的章节顺序与 Prompt 的模块顺序一致
    pub async fn generate(
        &self,
        project_name: &str,
        prompts: &PromptSet,
        config: &GenerationConfig,
    ) -> GeneratedDocument {
        debug!(
            "Generating {} sections with concurrency {}",
            prompts.len(),
            self.concurrency
        );
        let prompts: Vec<(ContentModule, String)> = prompts
            .iter()
            .map(|(module, prompt)| (module, prompt.to_string()))
            .collect();

        let sections: Vec<DocumentSection> = stream::iter(prompts)
            .map(|(module, prompt)| async move {
                self.generate_section(module, &prompt, config).await
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = sections.iter().filter(|s| s.is_failed()).count();
        info!(
            "Generated {} sections for {} ({} failed)",
            sections.len(),
            project_name,
            failed
        );

        GeneratedDocument {
            project_name: project_name.to_string(),
            format: config.style.format,
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::testing::{registry_with, ScriptedBackend};
    use crate::services::backend::LlmBackend;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn prompts(modules: &[ContentModule]) -> PromptSet {
        let mut prompts = PromptSet::default();
        for module in modules {
            prompts.insert(*module, format!("prompt for {}", module));
        }
        prompts
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let registry = Arc::new(BackendRegistry::new());
        assert_eq!(DocumentGenerator::new(registry.clone(), 0).concurrency(), 1);
        assert_eq!(DocumentGenerator::new(registry.clone(), 4).concurrency(), 4);
        assert_eq!(DocumentGenerator::new(registry, 64).concurrency(), 10);
    }

    #[tokio::test]
    async fn test_sections_follow_canonical_order() {
        let backend = Arc::new(ScriptedBackend::new("mock"));
        let generator = DocumentGenerator::new(Arc::new(registry_with(backend)), 3);
        let config = GenerationConfig::new("mock", "/p/shop");

        let document = generator
            .generate(
                "shop",
                &prompts(&[ContentModule::License, ContentModule::GlobalIntro, ContentModule::UseCases]),
                &config,
            )
            .await;

        assert_eq!(
            document.modules(),
            vec![ContentModule::GlobalIntro, ContentModule::UseCases, ContentModule::License]
        );
        assert_eq!(document.sections[0].body, "generated: prompt for global_intro");
        assert_eq!(document.sections[2].title, "License");
    }

    #[tokio::test]
    async fn test_failed_call_marks_section() {
        let backend = Arc::new(ScriptedBackend::new("qwen").failing_on("installation"));
        let generator = DocumentGenerator::new(Arc::new(registry_with(backend)), 2);
        let config = GenerationConfig::new("qwen", "/p/shop");

        let document = generator
            .generate(
                "shop",
                &prompts(&[ContentModule::GlobalIntro, ContentModule::Installation]),
                &config,
            )
            .await;

        assert_eq!(document.failed_modules(), vec![ContentModule::Installation]);
        let section = document.section(ContentModule::Installation).unwrap();
        assert!(section.body.starts_with("[qwen API Error]"));
        assert!(!document.section(ContentModule::GlobalIntro).unwrap().is_failed());
    }

    /// 记录同时进行的调用数，且让先发出的调用后完成
    struct SlowBackend {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, prompt: &str, _credential: &str) -> Result<String, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = if prompt.contains("global_intro") { 40 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_order_and_cap() {
        let backend = Arc::new(SlowBackend {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = BackendRegistry::new();
        registry.register(backend.clone());
        let generator = DocumentGenerator::new(Arc::new(registry), 2);
        let config = GenerationConfig::new("slow", "/p/shop");

        let document = generator
            .generate("shop", &prompts(&ContentModule::ALL), &config)
            .await;

        assert_eq!(document.modules(), ContentModule::ALL.to_vec());
        assert_eq!(document.sections[0].body, "prompt for global_intro");
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }
}
