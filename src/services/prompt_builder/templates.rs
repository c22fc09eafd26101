//! Prompt 模板
//!
//! 每个内容模块一个模板，风格说明按篇幅、格式、语气分别拼接

use crate::services::doc_generator::{ContentModule, DocFormat, DocLength, DocTone};

const GLOBAL_INTRO_TEMPLATE: &str = r#"Write the "Global Introduction" section of the documentation for the Java project "{project_name}".
Explain what the project does, how it is organised and which components matter most.

{features}

{style}"#;

const MODULE_INTRO_TEMPLATE: &str = r#"Write the "Module Introduction" section of the documentation for the Java project "{project_name}".
Introduce each package and its main types, and describe how the packages work together.

{features}

{style}"#;

const INSTALLATION_TEMPLATE: &str = r#"Write the "Installation" section of the documentation for the Java project "{project_name}".
Give step-by-step instructions to obtain, build and install the project, based on its build files and dependencies.

{features}

{style}"#;

const PREREQUISITES_TEMPLATE: &str = r#"Write the "Prerequisites" section of the documentation for the Java project "{project_name}".
List the JDK version, tools and third-party libraries a user needs before building or running it.

{features}

{style}"#;

const USE_CASES_TEMPLATE: &str = r#"Write the "Use Cases" section of the documentation for the Java project "{project_name}".
Describe typical ways to use the project, with short usage examples built on its public API and entry points.

{features}

{style}"#;

const DEBUG_SUGGESTIONS_TEMPLATE: &str = r#"Write the "Debug Suggestions" section of the documentation for the Java project "{project_name}".
Point out where problems are likely to appear and how to diagnose them, using the dependency hotspots and declared exceptions.

{features}

{style}"#;

const LICENSE_TEMPLATE: &str = r#"Write the "License" section of the documentation for the Java project "{project_name}".
State the license terms that apply; if no license file is known, say so and recommend adding one.

{features}

{style}"#;

pub fn template_for(module: ContentModule) -> &'static str {
    match module {
        ContentModule::GlobalIntro => GLOBAL_INTRO_TEMPLATE,
        ContentModule::ModuleIntro => MODULE_INTRO_TEMPLATE,
        ContentModule::Installation => INSTALLATION_TEMPLATE,
        ContentModule::Prerequisites => PREREQUISITES_TEMPLATE,
        ContentModule::UseCases => USE_CASES_TEMPLATE,
        ContentModule::DebugSuggestions => DEBUG_SUGGESTIONS_TEMPLATE,
        ContentModule::License => LICENSE_TEMPLATE,
    }
}

pub fn length_phrase(length: DocLength) -> &'static str {
    match length {
        DocLength::Minimal => "Keep it minimal: a few sentences or a short list.",
        DocLength::Normal => "Use a moderate length: a few short paragraphs.",
        DocLength::Detailed => "Be detailed: cover every relevant point and include examples.",
    }
}

pub fn format_phrase(format: DocFormat) -> &'static str {
    match format {
        DocFormat::Plain => "Write plain text without any markup.",
        DocFormat::Markdown => "Format the section body in Markdown and do not repeat the section heading.",
        DocFormat::Latex => "Format the section body in LaTeX without a preamble or \\section heading.",
    }
}

pub fn tone_phrase(tone: DocTone) -> &'static str {
    match tone {
        DocTone::Academic => "Use a formal, academic tone.",
        DocTone::Engineering => "Use a concise, practical engineering tone.",
        DocTone::BeginnerFriendly => "Write for beginners: explain terms and avoid jargon.",
    }
}
