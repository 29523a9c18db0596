use thiserror::Error;

/// Errors surfaced by the peripheral-supervision runtime.
///
/// These map onto the `internal_errors` bitmap (see [`crate::domain::supervised::ErrorBit`])
/// at the point a `run()` task decides which bit to raise; they are not themselves
/// part of the wire protocol.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("peripheral did not respond within the request window")]
    NoResponse,

    #[error("response frame failed checksum or framing: {0}")]
    BadResponse(String),

    #[error("failed to parse response at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("loop exceeded its health timeout")]
    Timeout,

    #[error("profile store error: {0}")]
    Profile(String),

    #[error("unsupported profile key/value combination: {0}")]
    Unsupported(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
