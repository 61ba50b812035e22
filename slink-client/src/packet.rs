use slink_protocol::frame::HEADER_LEN;
use slink_protocol::mseed::{Blockettes, Fsdh, PacketType};
use slink_protocol::{MseedVersion, SequenceNumber, SlHeader};

/// A delivered SeedLink packet, borrowing the session's receive buffer.
///
/// The borrow is only valid until the next collect call; convert with
/// [`to_owned()`](Packet::to_owned) to keep the record around.
#[derive(Copy, Clone, Debug)]
pub struct Packet<'a> {
    header: SlHeader,
    record: &'a [u8],
    version: MseedVersion,
}

impl<'a> Packet<'a> {
    pub(crate) fn new(header: SlHeader, record: &'a [u8], version: MseedVersion) -> Self {
        Self {
            header,
            record,
            version,
        }
    }

    /// The parsed 8-byte SeedLink frame header.
    pub fn header(&self) -> SlHeader {
        self.header
    }

    /// Sequence number for data packets; `None` for INFO packets.
    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.header.sequence()
    }

    /// True for records belonging to an INFO response.
    pub fn is_info(&self) -> bool {
        self.header.is_info()
    }

    /// The miniSEED record bytes (without the SeedLink header).
    pub fn record(&self) -> &'a [u8] {
        self.record
    }

    /// Length of the miniSEED record in bytes.
    pub fn reclen(&self) -> usize {
        self.record.len()
    }

    /// Total length on the wire, including the SeedLink header.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.record.len()
    }

    /// Detected miniSEED format version.
    pub fn mseed_version(&self) -> MseedVersion {
        self.version
    }

    /// Parse the miniSEED 2 fixed header of this record.
    pub fn fsdh(&self) -> slink_protocol::Result<Fsdh> {
        Fsdh::parse(self.record)
    }

    /// Collect the well-known blockettes of this record.
    pub fn blockettes(&self) -> slink_protocol::Result<Blockettes> {
        Blockettes::scan(self.record)
    }

    /// Classify the record content (data, detection, log message, ...).
    pub fn packet_type(&self) -> slink_protocol::Result<PacketType> {
        slink_protocol::mseed::packet_type(self.record)
    }

    /// Copy the record to the heap, detaching it from the receive buffer.
    pub fn to_owned(&self) -> OwnedPacket {
        OwnedPacket {
            header: self.header,
            record: self.record.to_vec(),
            version: self.version,
        }
    }
}

/// An owned SeedLink packet, detached from the session's receive buffer.
#[derive(Clone, Debug)]
pub struct OwnedPacket {
    header: SlHeader,
    record: Vec<u8>,
    version: MseedVersion,
}

impl OwnedPacket {
    pub fn header(&self) -> SlHeader {
        self.header
    }

    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.header.sequence()
    }

    pub fn is_info(&self) -> bool {
        self.header.is_info()
    }

    pub fn record(&self) -> &[u8] {
        self.record.as_slice()
    }

    pub fn reclen(&self) -> usize {
        self.record.len()
    }

    pub fn mseed_version(&self) -> MseedVersion {
        self.version
    }

    pub fn fsdh(&self) -> slink_protocol::Result<Fsdh> {
        Fsdh::parse(&self.record)
    }

    pub fn blockettes(&self) -> slink_protocol::Result<Blockettes> {
        Blockettes::scan(&self.record)
    }

    pub fn packet_type(&self) -> slink_protocol::Result<PacketType> {
        slink_protocol::mseed::packet_type(&self.record)
    }
}

impl From<Packet<'_>> for OwnedPacket {
    fn from(packet: Packet<'_>) -> Self {
        packet.to_owned()
    }
}
