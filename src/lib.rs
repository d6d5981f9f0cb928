pub mod config;
pub mod core;
pub mod domain;
pub mod llm;
pub mod prompt;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{LocalStorage, TomlConfig};
pub use core::{categorizer::ExpenseCategorizer, etl::CategorizerEngine, pipeline::ExpensePipeline};
pub use llm::{OllamaClient, OllamaSettings};
pub use prompt::PromptTemplate;
pub use utils::error::{CategorizerError, Result};
