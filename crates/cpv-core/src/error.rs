//! Error types for cpv

use thiserror::Error;

/// Result type alias using cpv's Error
pub type Result<T> = std::result::Result<T, Error>;

/// cpv error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Label errors (E100-E199)
    #[error("Label could not be decoded: {0}")]
    Decode(String),

    // Hierarchy errors (E200-E299)
    #[error("Path integrity violated: {0}")]
    PathIntegrity(String),

    // Store errors (E300-E399)
    #[error("Search unavailable: {0}. Check the database with `cpv doctor`.")]
    SearchUnavailable(String),

    // Request errors (E400-E499)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Code '{0}' not found. Run `cpv list` to browse the taxonomy.")]
    CodeNotFound(String),

    // Database errors (E500-E599)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "E100",
            Self::PathIntegrity(_) => "E200",
            Self::SearchUnavailable(_) => "E300",
            Self::InvalidQuery(_) => "E400",
            Self::CodeNotFound(_) => "E401",
            Self::DatabaseError(_) => "E500",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SearchUnavailable(_) => Some("cpv doctor".to_string()),
            Self::CodeNotFound(_) => Some("cpv list".to_string()),
            Self::InvalidQuery(_) => {
                Some("cpv search <query> --language de|fr|it|en".to_string())
            }
            Self::PathIntegrity(_) => Some("cpv import <file>".to_string()),
            Self::ConfigError(_) => Some("cpv config list".to_string()),
            _ => None,
        }
    }

    /// Whether the caller sent a request that can never succeed as-is
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidQuery(_) | Self::CodeNotFound(_))
    }
}
