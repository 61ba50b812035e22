use crate::version::ProtocolVersion;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame too short: expected {expected}, actual {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("record too short: expected at least {expected}, actual {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("invalid signature: expected SL or SLINFO, actual {actual:?}")]
    InvalidSignature { actual: [u8; 2] },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("command {command} requires protocol {required}, negotiated {actual}")]
    VersionMismatch {
        command: &'static str,
        required: ProtocolVersion,
        actual: ProtocolVersion,
    },

    #[error("not a miniSEED record")]
    NotMiniseed,

    #[error("invalid blockette chain: next offset {next} does not advance past {offset}")]
    InvalidBlocketteChain { offset: usize, next: usize },

    #[error("invalid info level: {0}")]
    InvalidInfoLevel(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
