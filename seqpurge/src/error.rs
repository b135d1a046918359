use thiserror::Error;

/// Fatal error classes of a trimming run. They travel inside `anyhow::Error`
/// and can be recovered with `downcast_ref::<TrimError>()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrimError {
    /// Invalid run configuration, detected before any output is produced.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Inconsistent input data, detected while the pipeline is running.
    #[error("invalid input: {0}")]
    Format(String),
}

impl TrimError {
    pub fn config<S: Into<String>>(msg: S) -> anyhow::Error {
        TrimError::Config(msg.into()).into()
    }

    pub fn format<S: Into<String>>(msg: S) -> anyhow::Error {
        TrimError::Format(msg.into()).into()
    }
}
