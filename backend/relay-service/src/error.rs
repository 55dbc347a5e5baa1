use crypto_core::CryptoError;
use std::time::Duration;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("transport read failed: {0}")]
    TransportRead(String),

    #[error("transport write failed: {0}")]
    TransportWrite(String),

    #[error("crypto transform failed: {0}")]
    CryptoTransform(String),

    #[error("no input received for {0:?}")]
    IdleTimeout(Duration),
}

impl From<CryptoError> for AppError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyGeneration(msg) => AppError::KeyGeneration(msg),
            other => AppError::CryptoTransform(other.to_string()),
        }
    }
}
