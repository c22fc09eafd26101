//! 服务层模块

pub mod backend;
pub mod code_loader;
pub mod doc_generator;
pub mod feature_extractor;
pub mod prompt_builder;

pub use backend::BackendRegistry;
