use thiserror::Error;

#[derive(Error, Debug)]
pub enum CategorizerError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Prompt template error: {message}")]
    TemplateError { message: String },

    #[error("Model API error (status {status}): {message}")]
    ModelApiError { status: u16, message: String },

    #[error("Model response rejected: {message}")]
    ResponseValidationError { message: String },

    #[error("Invalid input in row {row}: {message}")]
    InputError { row: usize, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    ModelOutput,
    Input,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CategorizerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::TemplateError { .. } => ErrorCategory::Configuration,
            Self::HttpError(_) | Self::ModelApiError { .. } => ErrorCategory::Network,
            Self::ResponseValidationError { .. } | Self::SerializationError(_) => {
                ErrorCategory::ModelOutput
            }
            Self::InputError { .. } | Self::CsvError(_) => ErrorCategory::Input,
            Self::ProcessingError { .. } => ErrorCategory::Processing,
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::ModelOutput => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 重試是否可能成功（HTTP 429 / 5xx 或連線錯誤）
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ModelApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::HttpError(_) => {
                "Make sure the Ollama server is running and reachable at the configured base URL"
            }
            Self::ModelApiError { status: 404, .. } => {
                "Pull the model first, e.g. `ollama pull <model>`, or pick an installed model"
            }
            Self::ModelApiError { .. } => {
                "Check the Ollama server logs; retry later or raise --max-retries"
            }
            Self::ResponseValidationError { .. } | Self::SerializationError(_) => {
                "Try a lower temperature, a fixed seed or a different model; use --lenient to accept unlisted categories"
            }
            Self::TemplateError { .. } => {
                "Check the prompt file: placeholders are {name}, literal braces must be doubled as {{ and }}"
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => {
                "Review the command line flags and the TOML configuration file"
            }
            Self::InputError { .. } | Self::CsvError(_) => {
                "Check the input CSV: it needs a header row with 'Product Name', 'Unit Price', 'Quantity' and 'Order Date'"
            }
            Self::ProcessingError { .. } => {
                "Re-run with --verbose to see which row failed, or drop --abort-on-error to continue past bad rows"
            }
            Self::IoError(_) | Self::ZipError(_) => {
                "Check that the input file exists and the output directory is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::HttpError(_) => "Could not reach the language model server".to_string(),
            Self::ModelApiError { status, message } => {
                format!("The language model server returned an error ({}): {}", status, message)
            }
            Self::ResponseValidationError { message } => {
                format!("The language model returned an unusable answer: {}", message)
            }
            Self::InputError { row, message } => format!("Row {} of the input is invalid: {}", row, message),
            Self::IoError(e) => format!("File system error: {}", e),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CategorizerError>;
