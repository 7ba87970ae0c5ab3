use thiserror::Error;

/// All errors produced by fftscope-core.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    /// Cooperative cancellation of a blocking read. Never surfaced to users.
    #[error("capture interrupted")]
    Interrupted,

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("capture is already running")]
    AlreadyRunning,

    #[error("capture already ran; create a new capture to restart")]
    NotRestartable,

    #[error("capture thread did not finish within {0:?}")]
    JoinTimeout(std::time::Duration),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScopeError {
    /// `true` for the cooperative-cancellation signal the capture loop
    /// treats as a normal exit.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ScopeError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, ScopeError>;
