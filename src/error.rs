//! Error types shared by every capability seam.

/// Result alias used across the crate.
pub type MotionResult<T> = Result<T, MotionError>;

/// Failure reported by an analytics or error-tracking sink.
///
/// Sinks are best-effort: callers inside this crate log and swallow these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink exists but is not callable in the expected shape
    #[error("sink is malformed: {0}")]
    Malformed(String),
    /// The sink was called and failed
    #[error("sink call failed: {0}")]
    Failed(String),
}

impl SinkError {
    /// Build a [`SinkError::Malformed`].
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Build a [`SinkError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors surfaced by host bindings and configuration loading.
#[derive(thiserror::Error, Debug)]
pub enum MotionError {
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("observer error: {0}")]
    Observer(String),

    #[error("config error: {0}")]
    Config(String),

    /// A host capability (window, performance, matchMedia) is missing
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl MotionError {
    /// An observer could not be created or attached.
    pub fn observer(msg: impl Into<String>) -> Self {
        Self::Observer(msg.into())
    }

    /// Configuration could not be parsed.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// A host capability is missing.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for MotionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
