//! Error types for the corvid core.

use thiserror::Error;

/// Convenience alias for results using [`IrcError`].
pub type Result<T, E = IrcError> = std::result::Result<T, E>;

/// Everything that can go wrong below the handler layer.
///
/// Handler code never sees these: transport faults are recovered by the
/// reconnector and encoding faults are absorbed by the throttle.
#[derive(Debug, Error)]
pub enum IrcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),

    #[error("connection to {addr} timed out after {secs}s")]
    ConnectTimeout { addr: String, secs: u64 },

    #[error("inbound line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("invalid handler pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("connection closed")]
    Closed,

    #[error("interrupted")]
    Interrupted,
}

impl IrcError {
    /// Whether this error ends supervision instead of triggering a reconnect.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, IrcError::Interrupted)
    }
}
