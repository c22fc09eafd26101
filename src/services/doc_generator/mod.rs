//! 文档生成模块
//!
//! 串联代码载入、特征提炼、Prompt 构建和章节生成四个阶段
//!
//! # 使用示例
//!
//! ```ignore
//! use futures::StreamExt;
//! use docgen_rs::services::doc_generator::{ContentModule, GenerationConfig, Pipeline, PipelineEvent};
//!
//! let pipeline = Pipeline::from_config(&get_config())?;
//! let config = GenerationConfig::new("qwen", "/path/to/project")
//!     .with_api_key(api_key)
//!     .with_modules([ContentModule::GlobalIntro, ContentModule::Installation]);
//!
//! let mut events = pipeline.run(config);
//! while let Some(event) = events.next().await {
//!     if let PipelineEvent::Completed { document } = &event {
//!         println!("{}", document.assemble());
//!     }
//! }
//! ```

mod generator;
mod pipeline;
pub mod types;

pub use pipeline::Pipeline;
pub use types::*;
