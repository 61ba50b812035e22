//! SeedLink wire protocol types and miniSEED record framing.
//!
//! This crate provides the protocol layer shared by SeedLink tooling:
//! session commands and responses, the 8-byte frame header, 24-bit
//! sequence numbers, and the miniSEED 2/3 record-length detection used to
//! delimit records in a byte stream.

pub mod command;
pub mod detect;
pub mod error;
pub mod frame;
pub mod info;
pub mod mseed;
pub mod response;
pub mod sequence;
pub mod time;
pub mod version;

pub use command::Command;
pub use detect::{Detection, MseedVersion, detect};
pub use error::{ProtocolError, Result};
pub use frame::SlHeader;
pub use info::InfoLevel;
pub use mseed::{Blockettes, Fsdh, PacketType};
pub use response::{HelloReply, Response};
pub use sequence::SequenceNumber;
pub use version::ProtocolVersion;
