use thiserror::Error;

/// Reasons a self-check campaign cannot be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelfCheckError {
    #[error("a self-check campaign is already running")]
    AlreadyRunning,
    #[error("self-check support is not compiled in (enable the `self-check` feature)")]
    Disabled,
}
