//! Failure taxonomy of a transcription run and the exit codes it maps to.

use scriptgrab_proto::ProtocolError;

/// Exit code of a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code of any validation or runtime failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code reserved for a user interrupt.
pub const EXIT_CANCELLED: i32 = 130;

/// Why a run ended without a `complete` message.
///
/// The `Display` text is exactly what the host receives in the `error`
/// message.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested audio path does not exist.
    #[error("File not found: {0}")]
    InputNotFound(String),

    /// The audio could not be decoded or has no samples.
    #[error("Could not determine audio duration")]
    UnreadableAudio,

    /// Model download, device setup or model initialization failed.
    #[error("{0}")]
    ModelLoad(String),

    /// The model raised during inference.
    #[error("{0}")]
    Inference(String),

    /// The user interrupted the run.
    #[error("Transcription cancelled by user")]
    Cancelled,

    /// Bad arguments, unreadable configuration or a broken output setup.
    #[error("{0}")]
    Setup(String),

    /// The protocol stream itself failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl EngineError {
    pub fn model_load(err: anyhow::Error) -> Self {
        EngineError::ModelLoad(format!("{err:#}"))
    }

    pub fn inference(err: anyhow::Error) -> Self {
        EngineError::Inference(format!("{err:#}"))
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }
}
