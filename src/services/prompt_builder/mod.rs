//! Prompt 构建
//!
//! 按启用的内容模块，把模板、特征、风格说明和用户自定义片段拼成最终 Prompt。
//! 同样的输入总是得到同样的输出。

mod templates;

pub use templates::{format_phrase, length_phrase, tone_phrase};

use crate::services::doc_generator::{
    ContentModule, GenerationConfig, ModuleFeatures, PipelineError, PromptSet, SemanticFeatureSet,
    StyleOptions,
};

/// 检查自定义 Prompt 长度（按字符计）
pub fn check_custom_prompt(custom_prompt: &str, max_chars: usize) -> Result<(), PipelineError> {
    let length = custom_prompt.chars().count();
    if length > max_chars {
        return Err(PipelineError::PromptTooLong {
            length,
            max: max_chars,
        });
    }
    Ok(())
}

/// 风格说明
pub fn style_instructions(style: &StyleOptions) -> String {
    [
        length_phrase(style.length),
        format_phrase(style.format),
        tone_phrase(style.tone),
    ]
    .join("\n")
}

fn format_features(features: Option<&ModuleFeatures>) -> String {
    let mut block = String::from("Project facts:");
    match features {
        Some(f) if !f.facts.is_empty() => {
            for fact in &f.facts {
                block.push_str("\n- ");
                block.push_str(fact);
            }
        }
        _ => block.push_str("\n- (none)"),
    }

    if let Some(summary) = features.and_then(|f| f.summary.as_deref()) {
        block.push_str("\n\nSummary: ");
        block.push_str(summary);
    }
    block
}

/// 单遍替换模板占位符，填入的内容不会再被当作占位符
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// 构建单个模块的 Prompt
pub fn format_module_prompt(
    module: ContentModule,
    features: &SemanticFeatureSet,
    config: &GenerationConfig,
) -> String {
    let features_block = format_features(features.get(module));
    let style = style_instructions(&config.style);
    let mut prompt = fill_template(
        templates::template_for(module),
        &[
            ("{project_name}", features.project_name.as_str()),
            ("{features}", features_block.as_str()),
            ("{style}", style.as_str()),
        ],
    );

    // 自定义片段原样追加
    if !config.custom_prompt.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&config.custom_prompt);
    }
    prompt
}

/// 为每个启用的模块构建 Prompt
pub fn build(
    features: &SemanticFeatureSet,
    config: &GenerationConfig,
    max_custom_prompt_chars: usize,
) -> Result<PromptSet, PipelineError> {
    check_custom_prompt(&config.custom_prompt, max_custom_prompt_chars)?;

    let mut prompts = PromptSet::default();
    for module in config.content_options.iter().copied() {
        prompts.insert(module, format_module_prompt(module, features, config));
    }
    Ok(prompts)
}
