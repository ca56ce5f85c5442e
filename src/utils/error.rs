use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

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

    #[error("Data error: {message}")]
    DataError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Optimization error: {message}")]
    OptimizationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Computation,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FitError {
    pub fn data(message: impl Into<String>) -> Self {
        FitError::DataError {
            message: message.into(),
        }
    }

    pub fn optimization(message: impl Into<String>) -> Self {
        FitError::OptimizationError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FitError::ConfigError { .. }
            | FitError::ConfigValidationError { .. }
            | FitError::InvalidConfigValueError { .. }
            | FitError::MissingConfigError { .. }
            | FitError::TomlError(_) => ErrorCategory::Configuration,
            FitError::CsvError(_)
            | FitError::DataError { .. }
            | FitError::ValidationError { .. } => ErrorCategory::Input,
            FitError::OptimizationError { .. } => ErrorCategory::Computation,
            FitError::ZipError(_)
            | FitError::IoError(_)
            | FitError::SerializationError(_)
            | FitError::TaskError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            // 重新以不同的初始值或參數執行通常可以解決
            ErrorCategory::Computation => ErrorSeverity::Medium,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            FitError::CsvError(_) | FitError::DataError { .. } => {
                "Check the trial CSV columns: participant, opt1_rewarded, mag_opt1, \
                 mag_opt2, choice1"
            }
            FitError::ValidationError { .. } => {
                "Check that every participant has at least one complete trial"
            }
            FitError::TomlError(_) | FitError::ConfigError { .. } => {
                "Check the TOML syntax and that every required section is present"
            }
            FitError::ConfigValidationError { .. }
            | FitError::InvalidConfigValueError { .. }
            | FitError::MissingConfigError { .. } => {
                "Fix the reported configuration value and run again"
            }
            FitError::OptimizationError { .. } => {
                "Try more initial values (--n-inits), a larger --max-iter \
                 or wider parameter bounds"
            }
            FitError::IoError(_) | FitError::ZipError(_) => {
                "Check that the input exists and the output directory is writable"
            }
            FitError::SerializationError(_) => "Results contain values that cannot be serialized",
            FitError::TaskError(_) => "A fitting worker crashed; rerun with --verbose for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            FitError::IoError(e) => format!("Could not read or write a file: {}", e),
            FitError::CsvError(e) => format!("The trial data could not be parsed: {}", e),
            FitError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            FitError::MissingConfigError { field } => format!("Setting '{}' is required", field),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_category() {
        let err = FitError::optimization("all initial values diverged");
        assert_eq!(err.category(), ErrorCategory::Computation);
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let err = FitError::MissingConfigError {
            field: "input".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);

        let err = FitError::IoError(std::io::Error::other("disk full"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_user_friendly_message_names_field() {
        let err = FitError::InvalidConfigValueError {
            field: "fit.n_inits".to_string(),
            value: "0".to_string(),
            reason: "Value must be at least 1".to_string(),
        };
        let message = err.user_friendly_message();
        assert!(message.contains("fit.n_inits"));
        assert!(message.contains("at least 1"));
    }
}
