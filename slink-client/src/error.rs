use std::time::Duration;

/// Errors that can occur while driving a SeedLink session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SeedLink protocol parsing error (bad frame, corrupt record, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] slink_protocol::ProtocolError),

    /// Operation exceeded the configured I/O timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server closed the connection (read returned 0 bytes).
    #[error("disconnected")]
    Disconnected,

    /// Server replied ERROR to the last command.
    #[error("server error: {0}")]
    ServerError(String),

    /// Server sent something other than the expected response line.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Session negotiation failed (e.g. every station was refused).
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The stream announced a record larger than the receive buffer.
    #[error("oversized record: {0} bytes")]
    OversizedRecord(usize),

    /// The connection description is unusable (missing address, conflicting
    /// station modes, nothing to request).
    #[error("configuration error: {0}")]
    Config(String),

    /// An INFO request is already pending; only one may be in flight.
    #[error("an INFO request is already pending")]
    InfoPending,
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
