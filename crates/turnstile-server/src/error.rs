//! Server runtime error types.

/// Errors from binding and running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket or listener I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] turnstile_core::ConfigError),
}
