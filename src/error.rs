use thiserror::Error;

/// Convenience result type used across the crate.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Error type shared by the connection, stage, conversion, pipeline and audit layers.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No connection strategy produced a working warehouse connection.
    #[error("not connected to the warehouse")]
    NotConnected,

    /// Underlying I/O error (temp directories, local stage directories).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited text could not be read or written.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "excel")]
    /// Workbook could not be opened or a sheet could not be read (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// A statement was rejected by the warehouse or its transport.
    #[error("sql error: {message}")]
    Sql { statement: String, message: String },

    /// A staged file could not be found.
    #[error("File {filename} not found in {stage}")]
    NotFound { stage: String, filename: String },

    /// The file extension has no converter.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// The workbook has no sheets at all.
    #[error("Excel file {filename} contains no sheets")]
    NoSheets { filename: String },

    /// Every sheet of the workbook was empty.
    #[error("File {filename} contained no data in any sheet")]
    EmptyWorkbook { filename: String },

    /// Input bytes or names that cannot be turned into a table or staged object.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration value missing or malformed.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A panic caught at a pipeline boundary.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ExtractError {
    pub fn sql(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sql {
            statement: statement.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for known platform restrictions on removing staged files.
    ///
    /// Managed sessions may refuse `REMOVE` outright or lack the privilege; the workflow treats
    /// those as "file stays where it is" rather than as failures.
    pub fn is_platform_restriction(&self) -> bool {
        match self {
            Self::Sql { message, .. } => {
                message.contains("REMOVE_FILES")
                    || message.contains("Unsupported statement")
                    || message.to_ascii_lowercase().contains("privilege")
            }
            _ => false,
        }
    }

    /// Returns `true` if the error means the staged object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
