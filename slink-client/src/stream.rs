use futures_core::Stream;

use crate::error::ClientError;
use crate::packet::OwnedPacket;
use crate::session::{Collect, SeedLinkSession};

/// Turn a session into a [`Stream`] of owned packets.
///
/// The stream reconnects through transient failures exactly like
/// [`collect()`](SeedLinkSession::collect) and ends when the session
/// terminates: at the END of a windowed replay, after
/// [`terminate()`](SeedLinkSession::terminate), or with a fatal protocol
/// error surfaced as `Err`.
pub fn packet_stream(
    mut session: SeedLinkSession,
) -> impl Stream<Item = Result<OwnedPacket, ClientError>> {
    async_stream::try_stream! {
        loop {
            let packet = match session.collect().await? {
                Collect::Packet(packet) => Some(packet.to_owned()),
                Collect::Terminated => None,
                Collect::NoPacket => continue,
            };
            match packet {
                Some(packet) => yield packet,
                None => break,
            }
        }
    }
}
