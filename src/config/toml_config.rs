use crate::core::{ColumnMapping, ConfigProvider, RowErrorPolicy};
use crate::llm::OllamaSettings;
use crate::utils::error::{CategorizerError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full run configuration. Every section is optional in the file and falls
/// back to the same defaults as the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub llm: OllamaSettings,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub processing: ProcessingConfig,
    pub prompt: PromptConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: String,
    pub columns: ColumnMapping,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: "data/test_input.csv".to_string(),
            columns: ColumnMapping::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
    pub name: String,
    pub formats: Vec<String>,
    pub compression: CompressionConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "data".to_string(),
            name: "categorized_expenses".to_string(),
            formats: vec!["csv".to_string()],
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub concurrent_requests: usize,
    pub on_row_error: RowErrorPolicy,
    pub strict_categories: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 1,
            on_row_error: RowErrorPolicy::Continue,
            strict_categories: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CategorizerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CategorizerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OLLAMA_BASE_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| CategorizerError::ConfigError {
            message: format!("Invalid env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("llm.base_url", &self.llm.base_url)?;
        validation::validate_non_empty_string("llm.model", &self.llm.model)?;
        validation::validate_range("llm.temperature", self.llm.temperature, 0.0, 2.0)?;
        validation::validate_positive_number("llm.timeout_seconds", self.llm.timeout_seconds as usize, 1)?;

        validation::validate_path("input.path", &self.input.path)?;
        validation::validate_file_extension("input.path", &self.input.path, &["csv"])?;
        validation::validate_column_mapping("input.columns", &self.input.columns)?;

        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_non_empty_string("output.name", &self.output.name)?;
        validation::validate_output_formats("output.formats", &self.output.formats)?;

        validation::validate_positive_number(
            "processing.concurrent_requests",
            self.processing.concurrent_requests,
            1,
        )?;

        if let Some(file) = &self.prompt.file {
            validation::validate_path("prompt.file", file)?;
        }

        Ok(())
    }
}

impl ConfigProvider for TomlConfig {
    fn input_path(&self) -> &str {
        &self.input.path
    }

    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn output_name(&self) -> &str {
        &self.output.name
    }

    fn output_formats(&self) -> &[String] {
        &self.output.formats
    }

    fn compress_output(&self) -> bool {
        self.output.compression.enabled
    }

    fn columns(&self) -> &ColumnMapping {
        &self.input.columns
    }

    fn concurrent_requests(&self) -> usize {
        self.processing.concurrent_requests
    }

    fn row_error_policy(&self) -> RowErrorPolicy {
        self.processing.on_row_error
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();

        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.input_path(), "data/test_input.csv");
        assert_eq!(config.output_formats(), &["csv".to_string()]);
        assert_eq!(config.row_error_policy(), RowErrorPolicy::Continue);
        assert!(config.processing.strict_categories);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[llm]
base_url = "http://gpu-box.local:11434"
model = "qwen2.5"
temperature = 0.2
seed = 42
max_retries = 5

[input]
path = "expenses/q1.csv"

[input.columns]
product_name = "Item"
unit_price = "Price"

[output]
path = "reports"
name = "q1_categorized"
formats = ["csv", "json"]

[output.compression]
enabled = true

[processing]
concurrent_requests = 4
on_row_error = "abort"
strict_categories = false

[prompt]
file = "prompt.toml"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.llm.model, "qwen2.5");
        assert_eq!(config.llm.seed, Some(42));
        assert_eq!(config.llm.max_retries, 5);
        // 未指定的欄位沿用預設值
        assert_eq!(config.llm.timeout_seconds, 120);
        assert_eq!(config.columns().product_name, "Item");
        assert_eq!(config.columns().quantity, "Quantity");
        assert_eq!(config.output_name(), "q1_categorized");
        assert!(config.compress_output());
        assert_eq!(config.concurrent_requests(), 4);
        assert_eq!(config.row_error_policy(), RowErrorPolicy::Abort);
        assert!(!config.processing.strict_categories);
        assert_eq!(config.prompt.file.as_deref(), Some("prompt.toml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("EXPENSE_TEST_OLLAMA_URL", "http://10.0.0.5:11434");

        let toml_content = r#"
[llm]
base_url = "${EXPENSE_TEST_OLLAMA_URL}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.llm.base_url, "http://10.0.0.5:11434");

        std::env::remove_var("EXPENSE_TEST_OLLAMA_URL");
    }

    #[test]
    fn test_config_validation() {
        let invalid_url = TomlConfig::from_toml_str("[llm]\nbase_url = \"not-a-url\"\n").unwrap();
        assert!(invalid_url.validate().is_err());

        let bad_format = TomlConfig::from_toml_str("[output]\nformats = [\"xlsx\"]\n").unwrap();
        assert!(bad_format.validate().is_err());

        let hot = TomlConfig::from_toml_str("[llm]\ntemperature = 3.5\n").unwrap();
        assert!(hot.validate().is_err());

        let zero = TomlConfig::from_toml_str("[processing]\nconcurrent_requests = 0\n").unwrap();
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_uppercase_input_extension_is_valid() {
        let config = TomlConfig::from_toml_str("[input]\npath = \"reports/EXPENSES.CSV\"\n").unwrap();
        assert!(config.validate().is_ok());

        let xlsx = TomlConfig::from_toml_str("[input]\npath = \"reports/expenses.xlsx\"\n").unwrap();
        assert!(xlsx.validate().is_err());
    }

    #[test]
    fn test_unknown_row_error_policy_is_rejected() {
        assert!(TomlConfig::from_toml_str("[processing]\non_row_error = \"explode\"\n").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[llm]\nmodel = \"gemma3:12b\"\n\n[output]\nformats = [\"tsv\"]\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.llm.model, "gemma3:12b");
        assert_eq!(config.output_formats(), &["tsv".to_string()]);
    }
}
