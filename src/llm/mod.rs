pub mod ollama;
pub mod response;

pub use ollama::{OllamaClient, OllamaSettings};
pub use response::{parse_classification, strip_json_fences};
