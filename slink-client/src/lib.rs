//! SeedLink streaming client for real-time miniSEED data.
//!
//! A [`SeedLinkSession`] keeps a long-lived connection to a SeedLink
//! server, negotiates stream subscriptions, recovers from disconnects by
//! resuming from the last delivered sequence number per stream, and hands
//! complete miniSEED records to the caller one at a time.

pub mod config;
pub mod error;
pub mod glob;
pub mod packet;
pub mod session;
pub mod stream;
pub mod streams;

mod connection;
mod negotiate;
mod statefile;

#[cfg(test)]
mod mock;

pub use config::{BatchMode, SessionConfig};
pub use error::{ClientError, Result};
pub use packet::{OwnedPacket, Packet};
pub use session::{BUFSIZE, Collect, LinkState, SeedLinkSession, ServerInfo, ping};
pub use streams::{StreamEntry, StreamRegistry};
