use thiserror::Error;

/// All errors produced by wavecast-core.
#[derive(Debug, Error)]
pub enum WavecastError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("{engine} does not support file-mode transcription")]
    NotImplemented { engine: String },

    #[error("cloud recognizer request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WavecastError>;
