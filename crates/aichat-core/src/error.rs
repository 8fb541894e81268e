//! Error types shared by every part of the core library

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Attachment error: {0}")]
    Attachment(String),
}

pub type ChatResult<T> = Result<T, ChatError>;
