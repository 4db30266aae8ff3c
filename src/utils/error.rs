use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Shapefile error: {0}")]
    ShapefileError(#[from] shapefile::Error),

    #[error("GeoPackage error: {0}")]
    SqliteError(#[from] rusqlite::Error),

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

    #[error("Column '{column}' not found in dataset '{dataset}'")]
    MissingColumn { dataset: String, column: String },

    #[error("Input '{path}' parsed as a single column; expected delimiter '{expected}'")]
    DelimiterMismatch { path: String, expected: char },

    #[error("Field name '{field}' exceeds the {limit}-character limit of the {format} format")]
    FieldNameTooLong {
        field: String,
        limit: usize,
        format: String,
    },

    #[error("Unsupported spatial reference EPSG:{srid}")]
    UnsupportedSrid { srid: u32 },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// 錯誤分類，用於日誌與退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Network,
    Processing,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 根據錯誤嚴重程度決定退出碼
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,      // 警告，但成功
            ErrorSeverity::Medium => 2,   // 重試錯誤
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        }
    }
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::CsvError(_)
            | EtlError::MissingColumn { .. }
            | EtlError::DelimiterMismatch { .. } => ErrorCategory::Input,
            EtlError::ApiError(_) => ErrorCategory::Network,
            EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. }
            | EtlError::UnsupportedSrid { .. } => ErrorCategory::Processing,
            EtlError::ZipError(_)
            | EtlError::ShapefileError(_)
            | EtlError::SqliteError(_)
            | EtlError::FieldNameTooLong { .. } => ErrorCategory::Output,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::Output => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::DelimiterMismatch { expected, .. } => format!(
                "Check the input file separator; it is read with '{}' (use --delimiter to change it)",
                expected
            ),
            EtlError::MissingColumn { column, .. } => format!(
                "Make sure the input header contains a '{}' column or set --address-column",
                column
            ),
            EtlError::FieldNameTooLong { .. } => {
                "Add a rename entry mapping the long column to a name of at most 10 characters"
                    .to_string()
            }
            EtlError::ApiError(_) => {
                "Check network connectivity and the geocoding endpoint, then rerun".to_string()
            }
            EtlError::IoError(_) => {
                "Verify that the input files exist and the output directory is writable".to_string()
            }
            EtlError::SqliteError(_) | EtlError::ShapefileError(_) | EtlError::ZipError(_) => {
                "Remove partially written outputs and rerun the export".to_string()
            }
            _ if self.category() == ErrorCategory::Configuration => {
                "Review the configuration file or command line flags".to_string()
            }
            _ => "Rerun with --verbose for more details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("配置錯誤: {}", self),
            ErrorCategory::Input => format!("輸入資料錯誤: {}", self),
            ErrorCategory::Network => format!("網路請求失敗: {}", self),
            ErrorCategory::Processing => format!("資料處理失敗: {}", self),
            ErrorCategory::Output => format!("輸出寫入失敗: {}", self),
            ErrorCategory::System => format!("系統錯誤: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
