use thiserror::Error;

/// Why a media locator or attachment could not be turned into a local file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Nothing found for {0}")]
    NotFound(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Downloader failed: {0}")]
    ToolFailed(String),
}

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Call transport error: {0}")]
    Transport(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Nothing is playing")]
    EmptyQueue,

    #[error("Queue is full ({0} tracks)")]
    QueueFull(usize),

    #[error("Calls are not supported here: {0}")]
    UnsupportedChat(String),

    #[error("Not in a voice call")]
    NotInCall,

    #[error("Playback was stopped before the download finished")]
    Cancelled,

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the chat-side state is guaranteed untouched by this failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQueue
                | Self::QueueFull(_)
                | Self::UnsupportedChat(_)
                | Self::NotInCall
                | Self::Cancelled
                | Self::Resolution(ResolveError::NotFound(_))
        )
    }

    /// Message shown in the chat (command reply or panel toast).
    pub fn user_message(&self) -> String {
        format!("**[VoiceMod]** Error: `{}`", self)
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
