pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::RowErrorPolicy;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

pub use cli::LocalStorage;
pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "expense-categorizer")]
#[command(about = "Categorize business expenses for US LLC tax purposes with a local LLM")]
pub struct CliConfig {
    /// Input CSV with 'Product Name', 'Unit Price', 'Quantity', 'Order Date' columns [default: data/test_input.csv]
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output directory [default: data]
    #[arg(long)]
    pub output_path: Option<String>,

    /// Base name of the output files [default: categorized_expenses]
    #[arg(long)]
    pub output_name: Option<String>,

    /// Output formats: csv, tsv, json [default: csv]
    #[arg(long, value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Bundle all output files into one zip archive
    #[arg(long)]
    pub compress: bool,

    /// Ollama server URL [default: http://localhost:11434]
    #[arg(long, env = "OLLAMA_BASE_URL")]
    pub ollama_base_url: Option<String>,

    /// Ollama model name [default: llama3.2]
    #[arg(short, long, env = "OLLAMA_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature [default: 0.1]
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Fixed sampling seed for reproducible answers
    #[arg(long)]
    pub seed: Option<u64>,

    /// Retries for 429 / 5xx / connection failures [default: 3]
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Initial backoff delay in milliseconds [default: 1000]
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Per-request timeout in seconds [default: 120]
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// Maximum model calls in flight [default: 1]
    #[arg(long)]
    pub concurrent_requests: Option<usize>,

    /// Prompt template file (.toml with `template`, or raw text)
    #[arg(long)]
    pub prompt_file: Option<String>,

    /// TOML configuration file; command line flags take precedence
    #[arg(short, long)]
    pub config: Option<String>,

    /// Stop at the first row that fails instead of recording an Error row
    #[arg(long)]
    pub abort_on_error: bool,

    /// Accept categories outside the closed list (mapped to Other Business Expense)
    #[arg(long)]
    pub lenient: bool,

    /// Render the prompt for every row without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the Ollama availability check before processing
    #[arg(long)]
    pub skip_health_check: bool,

    /// Log CPU / memory statistics per phase
    #[arg(long)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 將命令列參數覆蓋到配置上（命令列優先）
    pub fn apply_to(&self, config: &mut TomlConfig) {
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if let Some(path) = &self.output_path {
            config.output.path = path.clone();
        }
        if let Some(name) = &self.output_name {
            config.output.name = name.clone();
        }
        if !self.formats.is_empty() {
            config.output.formats = self.formats.iter().map(|f| f.trim().to_lowercase()).collect();
        }
        if self.compress {
            config.output.compression.enabled = true;
        }

        if let Some(url) = &self.ollama_base_url {
            config.llm.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if self.seed.is_some() {
            config.llm.seed = self.seed;
        }
        if let Some(retries) = self.max_retries {
            config.llm.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.llm.retry_delay_ms = delay;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.llm.timeout_seconds = timeout;
        }

        if let Some(concurrent) = self.concurrent_requests {
            config.processing.concurrent_requests = concurrent;
        }
        if self.abort_on_error {
            config.processing.on_row_error = RowErrorPolicy::Abort;
        }
        if self.lenient {
            config.processing.strict_categories = false;
        }
        if let Some(file) = &self.prompt_file {
            config.prompt.file = Some(file.clone());
        }
        if self.monitor {
            config.monitoring.enabled = true;
        }
        if self.json_logs {
            config.monitoring.json_logs = true;
        }
    }

    /// 載入 TOML（若有指定）並套用命令列覆蓋
    pub fn resolve(&self) -> crate::Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }
}
