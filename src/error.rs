use crate::adb::AdbError;
use crate::tasks::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while driving the game screen or running an activity.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Adb(#[from] AdbError),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Image processing failed: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    #[error("Template '{path:?}' could not be loaded: {source}")]
    TemplateLoad {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Template '{name}' not found on screen")]
    TemplateNotFound { name: String },

    #[error("No screen point configured for '{name}'")]
    MissingPoint { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid task data: {0}")]
    InvalidTaskData(String),
}

impl AutomationError {
    /// Errors that come from a broken task or configuration rather than the
    /// game state; retrying them later cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AutomationError::InvalidTaskData(_) | AutomationError::MissingPoint { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {path:?} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Startup errors that stop the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Adb(#[from] AdbError),
}
