//! The SeedLink session: connection lifecycle and record delivery.
//!
//! One session drives one server connection through `Down → Up → Data`,
//! negotiating subscriptions on the way up, delimiting miniSEED records in
//! the receive buffer while streaming, and falling back to `Down` with a
//! reconnect delay whenever the link dies. The caller turns the crank with
//! [`collect()`](SeedLinkSession::collect) (waits for the next packet) or
//! [`collect_nb()`](SeedLinkSession::collect_nb) (one pass, never waits).

use std::path::Path;
use std::time::Duration;

use slink_protocol::detect::{Detection, MIN_RECLEN, MseedVersion, detect};
use slink_protocol::frame::HEADER_LEN;
use slink_protocol::mseed::Fsdh;
use slink_protocol::{Command, HelloReply, InfoLevel, ProtocolVersion, SequenceNumber, SlHeader};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{BatchMode, SessionConfig};
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::negotiate;
use crate::packet::{OwnedPacket, Packet};
use crate::statefile;
use crate::streams::StreamRegistry;

/// Size of the receive buffer; comfortably above the largest record plus
/// its frame header.
pub const BUFSIZE: usize = 8192;

/// Sleep between passes while the reconnect delay is running.
const RECONNECT_THROTTLE: Duration = Duration::from_millis(500);

/// Connection lifecycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No connection; waiting out the reconnect delay.
    Down,
    /// TCP connected and HELLO exchanged; not yet negotiated.
    Up,
    /// Streaming packets.
    Data,
}

/// Which query an expected INFO response belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum QueryMode {
    Idle,
    Info,
    KeepAlive,
}

/// A three-state interval timer: reset, running since an instant, elapsed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Timer {
    Reset,
    Running(Instant),
    Elapsed,
}

impl Timer {
    fn reset(&mut self) {
        *self = Self::Reset;
    }

    fn is_running(self) -> bool {
        matches!(self, Self::Running(_))
    }

    fn is_elapsed(self) -> bool {
        self == Self::Elapsed
    }

    fn update(&mut self, now: Instant, interval: Duration) {
        match *self {
            Self::Reset => {
                *self = if interval.is_zero() {
                    Self::Elapsed
                } else {
                    Self::Running(now)
                };
            }
            Self::Running(since) if now.duration_since(since) > interval => {
                *self = Self::Elapsed;
            }
            _ => {}
        }
    }
}

/// Identity of the connected server, from the HELLO banner.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    /// Software name (e.g. `"SeedLink"`).
    pub software: String,
    /// Negotiated protocol version.
    pub version: ProtocolVersion,
    /// Remainder of the banner line after the version token.
    pub server_id: String,
    /// Site/organization line.
    pub site: String,
}

impl From<HelloReply> for ServerInfo {
    fn from(hello: HelloReply) -> Self {
        Self {
            software: hello.software,
            version: hello.version,
            server_id: hello.server_id,
            site: hello.site,
        }
    }
}

/// Outcome of a collect call.
#[derive(Debug)]
pub enum Collect<'a> {
    /// A packet was delivered; the borrow is valid until the next call.
    Packet(Packet<'a>),
    /// Non-blocking collect found nothing ready.
    NoPacket,
    /// The session is over; further calls return `Terminated` again.
    Terminated,
}

/// The packet most recently framed out of the receive buffer.
#[derive(Copy, Clone, Debug)]
struct CurrentPacket {
    offset: usize,
    length: usize,
    header: SlHeader,
    version: MseedVersion,
}

/// Outcome of one state-machine pass.
#[derive(Copy, Clone, Debug)]
enum Step {
    Delivered(CurrentPacket),
    Terminated,
    Idle,
}

/// How the read step treats an idle socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadMode {
    /// Wait up to 500 ms for readability.
    Wait,
    /// Take only what is already available.
    Immediate,
}

/// Per-connection persistent state.
struct State {
    databuf: Box<[u8; BUFSIZE]>,
    recptr: usize,
    sendptr: usize,
    expect_info: bool,
    query_mode: QueryMode,
    link_state: LinkState,
    netto: Timer,
    netdly: Timer,
    keepalive: Timer,
}

impl State {
    fn new() -> Self {
        Self {
            databuf: Box::new([0u8; BUFSIZE]),
            recptr: 0,
            sendptr: 0,
            expect_info: false,
            query_mode: QueryMode::Idle,
            link_state: LinkState::Down,
            netto: Timer::Reset,
            // The first connection attempt is immediate
            netdly: Timer::Elapsed,
            keepalive: Timer::Reset,
        }
    }

    fn unread(&self) -> usize {
        self.recptr - self.sendptr
    }
}

/// A long-lived SeedLink session.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> slink_client::Result<()> {
/// use slink_client::{Collect, SeedLinkSession, SessionConfig};
///
/// let config = SessionConfig {
///     address: "rtserve.iris.washington.edu:18000".to_owned(),
///     ..SessionConfig::default()
/// };
/// let mut session = SeedLinkSession::new(config);
/// session.add_stream("IU", "ANMO", Some("BH?.D"), None, None)?;
///
/// loop {
///     match session.collect().await? {
///         Collect::Packet(packet) => {
///             println!("seq={:?} len={}", packet.sequence(), packet.reclen());
///         }
///         Collect::Terminated => break,
///         Collect::NoPacket => unreachable!("collect() always waits"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SeedLinkSession {
    config: SessionConfig,
    streams: StreamRegistry,
    conn: Option<Connection>,
    server: Option<ServerInfo>,
    batch: BatchMode,
    pending_info: Option<InfoLevel>,
    terminate: bool,
    state: State,
}

impl SeedLinkSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            streams: StreamRegistry::new(),
            conn: None,
            server: None,
            batch: BatchMode::Off,
            pending_info: None,
            terminate: false,
            state: State::new(),
        }
    }

    // -- Subscription setup --

    /// Add a multi-station subscription (see
    /// [`StreamRegistry::add_stream`]).
    pub fn add_stream(
        &mut self,
        net: &str,
        sta: &str,
        selectors: Option<&str>,
        seqnum: Option<SequenceNumber>,
        timestamp: Option<&str>,
    ) -> Result<()> {
        self.streams.add_stream(net, sta, selectors, seqnum, timestamp)
    }

    /// Configure the session for uni-station mode (see
    /// [`StreamRegistry::set_uni_params`]).
    pub fn set_uni_params(
        &mut self,
        selectors: Option<&str>,
        seqnum: Option<SequenceNumber>,
        timestamp: Option<&str>,
    ) -> Result<()> {
        self.streams.set_uni_params(selectors, seqnum, timestamp)
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut StreamRegistry {
        &mut self.streams
    }

    // -- Accessors --

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Identity of the server from the last successful HELLO.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    pub fn link_state(&self) -> LinkState {
        self.state.link_state
    }

    /// Batch command mode negotiation outcome.
    pub fn batch_mode(&self) -> BatchMode {
        self.batch
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate
    }

    // -- Requests --

    /// Queue an INFO request; at most one may be pending.
    ///
    /// The request goes out at the next opportunity (while streaming, or
    /// right after connecting when no streams are configured) and the
    /// response records are delivered as INFO packets.
    pub fn request_info(&mut self, level: InfoLevel) -> Result<()> {
        if self.pending_info.is_some() {
            warn!(%level, "cannot queue INFO request, one is already pending");
            return Err(ClientError::InfoPending);
        }
        self.pending_info = Some(level);
        Ok(())
    }

    /// Request cooperative termination.
    ///
    /// The next collect call closes the link (after handing out packets
    /// already buffered) and returns [`Collect::Terminated`].
    pub fn terminate(&mut self) {
        info!("terminating connection");
        self.terminate = true;
    }

    // -- State persistence --

    /// Save resume state (`NET STA HEXSEQ TIMESTAMP` lines) to `path`.
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<usize> {
        statefile::save(&self.streams, path)
    }

    /// Recover resume state from `path` into matching subscriptions.
    pub fn recover_state(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        statefile::recover(&mut self.streams, path)
    }

    // -- Collecting --

    /// Drive the session until a packet arrives or it terminates.
    ///
    /// Blocks (cooperatively) across reconnects; transient network failures
    /// are retried after the configured delay and never surface here.
    pub async fn collect(&mut self) -> Result<Collect<'_>> {
        loop {
            match self.tick(ReadMode::Wait).await? {
                Step::Delivered(current) => {
                    return Ok(Collect::Packet(self.packet_view(current)));
                }
                Step::Terminated => return Ok(Collect::Terminated),
                Step::Idle => {}
            }
        }
    }

    /// Make exactly one pass; return [`Collect::NoPacket`] when nothing is
    /// ready.
    pub async fn collect_nb(&mut self) -> Result<Collect<'_>> {
        match self.tick(ReadMode::Immediate).await? {
            Step::Delivered(current) => Ok(Collect::Packet(self.packet_view(current))),
            Step::Terminated => Ok(Collect::Terminated),
            Step::Idle => Ok(Collect::NoPacket),
        }
    }

    fn packet_view(&self, current: CurrentPacket) -> Packet<'_> {
        let start = current.offset + HEADER_LEN;
        Packet::new(
            current.header,
            &self.state.databuf[start..start + current.length],
            current.version,
        )
    }

    // -- The state machine --

    async fn tick(&mut self, mode: ReadMode) -> Result<Step> {
        // A caller-submitted INFO request marks the query mode immediately
        if self.pending_info.is_some() {
            self.state.query_mode = QueryMode::Info;
        }

        // Fresh or dropped link: sanity-check the descriptor
        if self.conn.is_none() && !self.terminate {
            if let Err(err) = self.validate() {
                error!(error = %err, "unusable connection description");
                self.terminate = true;
                return Err(err);
            }
            self.state.netto.reset();
            self.state.keepalive.reset();
        }

        if self.terminate {
            self.disconnect(true).await;
        } else {
            if self.conn.is_none() {
                self.state.link_state = LinkState::Down;
            }

            // Idle timeout: tear the link down and retry after the delay
            if self.state.link_state == LinkState::Data
                && !self.config.netto.is_zero()
                && self.state.netto.is_elapsed()
            {
                info!(
                    idle = ?self.config.netto,
                    delay = ?self.config.netdly,
                    "network idle timeout, reconnecting"
                );
                self.disconnect(false).await;
                self.state.netto.reset();
                self.state.netdly.reset();
            }

            // Keepalive probe, unless an INFO exchange is already in flight
            if self.state.link_state == LinkState::Data
                && !self.config.keepalive.is_zero()
                && !self.state.expect_info
                && self.state.keepalive.is_elapsed()
                && let Some(conn) = self.conn.as_mut()
            {
                debug!("sending keepalive request");
                match conn.send_command(&Command::Info { level: InfoLevel::Id }).await {
                    Ok(()) => {
                        self.state.query_mode = QueryMode::KeepAlive;
                        self.state.expect_info = true;
                        self.state.keepalive.reset();
                    }
                    Err(err) => debug!(error = %err, "keepalive send failed"),
                }
            }

            // In-stream INFO request
            if self.state.link_state == LinkState::Data
                && !self.state.expect_info
                && let Some(level) = self.pending_info
                && let Some(conn) = self.conn.as_mut()
            {
                match conn.send_command(&Command::Info { level }).await {
                    Ok(()) => {
                        self.state.query_mode = QueryMode::Info;
                        self.state.expect_info = true;
                    }
                    Err(err) => {
                        warn!(error = %err, "INFO request failed to send");
                        self.state.query_mode = QueryMode::Idle;
                    }
                }
                self.pending_info = None;
            }

            // Throttle while the reconnect delay runs
            if self.state.link_state == LinkState::Down && self.state.netdly.is_running() {
                tokio::time::sleep(RECONNECT_THROTTLE).await;
            }

            // Reconnect
            if self.state.link_state == LinkState::Down && self.state.netdly.is_elapsed() {
                match self.connect_link().await {
                    Ok(()) => self.state.link_state = LinkState::Up,
                    Err(err) => {
                        warn!(
                            address = %self.config.address,
                            error = %err,
                            "connection attempt failed"
                        );
                    }
                }
                self.state.netto.reset();
                self.state.netdly.reset();
                self.state.keepalive.reset();
            }

            // Negotiate, or send a bare INFO query when nothing is subscribed
            if self.state.link_state == LinkState::Up {
                let result = self.negotiate_link().await;
                match result {
                    Ok(()) => {
                        self.state.recptr = 0;
                        self.state.sendptr = 0;
                        self.state.link_state = LinkState::Data;
                    }
                    Err(err) => {
                        warn!(error = %err, "negotiation with server failed");
                        self.disconnect(false).await;
                        self.state.netdly.reset();
                    }
                }
            }
        }

        // Frame packets out of the receive buffer
        match self.process_buffer() {
            Ok(Some(current)) => return Ok(Step::Delivered(current)),
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "unrecoverable data stream, terminating");
                self.terminate = true;
                self.disconnect(false).await;
                return Err(err);
            }
        }

        // Trap door: buffered packets were handed out before we stop
        if self.terminate {
            self.state.link_state = LinkState::Down;
            return Ok(Step::Terminated);
        }

        // Shift the unread remainder to the front of the buffer
        if self.state.sendptr > 0 {
            let (sendptr, recptr) = (self.state.sendptr, self.state.recptr);
            self.state.databuf.copy_within(sendptr..recptr, 0);
            self.state.recptr = recptr - sendptr;
            self.state.sendptr = 0;
        }

        // A stalled stream ends with one of two bare literals
        if self.state.unread() == 7 && self.state.databuf[..7] == *b"ERROR\r\n" {
            error!("server reported an error with the last command");
            self.terminate = true;
            self.disconnect(false).await;
            return Err(ClientError::ServerError(
                "server reported an error with the last command".to_owned(),
            ));
        }
        if self.state.unread() == 3 && self.state.databuf[..3] == *b"END" {
            info!("end of buffer or selected time window");
            self.terminate = true;
            self.disconnect(false).await;
            return Ok(Step::Terminated);
        }

        // Read from the socket
        if self.state.link_state == LinkState::Data && self.state.recptr < BUFSIZE {
            let mut received = None;
            let mut failed = false;

            if let Some(conn) = self.conn.as_mut() {
                let buf = &mut self.state.databuf[self.state.recptr..];
                let outcome = match mode {
                    ReadMode::Wait => conn.recv_ready(buf).await,
                    ReadMode::Immediate => conn.try_recv(buf),
                };
                match outcome {
                    Ok(n) => received = n,
                    Err(err) => {
                        debug!(error = %err, "read failed, reconnecting after delay");
                        failed = true;
                    }
                }
            }

            if failed {
                self.disconnect(false).await;
                self.state.netdly.reset();
            } else if let Some(n) = received {
                self.state.recptr += n;
                debug_assert!(self.state.recptr <= BUFSIZE);
                // Traffic resets the idle and keepalive clocks
                self.state.netto.reset();
                self.state.keepalive.reset();
            }
        }

        // Advance the timers
        let now = Instant::now();
        if !self.config.netto.is_zero() {
            self.state.netto.update(now, self.config.netto);
        }
        if !self.config.keepalive.is_zero() {
            self.state.keepalive.update(now, self.config.keepalive);
        }
        self.state.netdly.update(now, self.config.netdly);

        Ok(Step::Idle)
    }

    /// Frame complete packets out of `databuf`, updating the stream table
    /// and swallowing keepalive responses. Returns the first packet due for
    /// delivery, or `None` when the buffer needs more bytes.
    fn process_buffer(&mut self) -> Result<Option<CurrentPacket>> {
        while self.state.unread() >= HEADER_LEN + MIN_RECLEN {
            let offset = self.state.sendptr;
            let available = self.state.unread();

            let detection = detect(&self.state.databuf[offset + HEADER_LEN..self.state.recptr])?;
            let (version, length) = match detection {
                Detection::Record { version, length } => (version, length),
                Detection::Incomplete => break,
            };

            // A record that cannot fit the buffer can never complete
            if HEADER_LEN + length > BUFSIZE {
                return Err(ClientError::OversizedRecord(length));
            }
            if HEADER_LEN + length > available {
                break;
            }

            let header = SlHeader::parse(&self.state.databuf[offset..offset + HEADER_LEN])?;
            let mut deliver = true;

            match header {
                SlHeader::Info { more } => {
                    if !self.state.expect_info {
                        warn!("unexpected INFO packet received, discarding");
                        deliver = false;
                    } else {
                        if !more {
                            self.state.expect_info = false;
                        }
                        // Keepalive responses are consumed silently
                        if self.state.query_mode == QueryMode::KeepAlive {
                            deliver = false;
                            if more {
                                warn!("non-terminated keepalive response received");
                            } else {
                                debug!("keepalive response received");
                            }
                        }
                    }
                    if self.state.query_mode != QueryMode::Idle {
                        self.state.query_mode = QueryMode::Idle;
                    }
                }
                SlHeader::Data { sequence } => {
                    let record = &self.state.databuf[offset + HEADER_LEN..offset + HEADER_LEN + length];
                    match Fsdh::parse(record) {
                        Ok(fsdh) => {
                            let timestamp = fsdh.start_time_string().ok();
                            // No subscription match is logged by the
                            // registry; the packet is delivered regardless
                            self.streams.update(
                                &fsdh.network,
                                &fsdh.station,
                                sequence,
                                timestamp.as_deref(),
                            );
                        }
                        Err(err) => {
                            debug!(error = %err, "record header unreadable, not tracked");
                        }
                    }
                }
            }

            self.state.sendptr = offset + HEADER_LEN + length;
            debug_assert!(self.state.sendptr <= self.state.recptr);

            if deliver {
                return Ok(Some(CurrentPacket {
                    offset,
                    length,
                    header,
                    version,
                }));
            }
        }

        Ok(None)
    }

    async fn connect_link(&mut self) -> Result<()> {
        let (conn, server) = handshake(&self.config.address, self.config.iotimeout).await?;
        info!(
            address = %self.config.address,
            software = %server.software,
            version = %server.version,
            site = %server.site,
            "connected to SeedLink server"
        );
        self.server = Some(server);
        self.conn = Some(conn);
        Ok(())
    }

    async fn negotiate_link(&mut self) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::Disconnected);
        };

        if self.streams.is_empty() {
            // Bare-query mode: nothing to negotiate, issue the INFO now
            if let Some(level) = self.pending_info {
                conn.send_command(&Command::Info { level }).await?;
                self.pending_info = None;
                self.state.query_mode = QueryMode::Info;
                self.state.expect_info = true;
            }
            return Ok(());
        }

        self.state.expect_info = false;
        let version = self
            .server
            .as_ref()
            .map(|server| server.version)
            .unwrap_or(ProtocolVersion::UNKNOWN);

        negotiate::configure(conn, &self.config, &self.streams, version, &mut self.batch).await
    }

    async fn disconnect(&mut self, send_bye: bool) {
        if let Some(mut conn) = self.conn.take() {
            if send_bye {
                let _ = conn.send_command(&Command::Bye).await;
            }
            let _ = conn.shutdown().await;
            debug!("link closed");
        }
        self.state.link_state = LinkState::Down;
    }

    fn validate(&self) -> Result<()> {
        if self.config.address.trim().is_empty() {
            return Err(ClientError::Config("no server address configured".to_owned()));
        }
        if self.streams.is_empty() && self.pending_info.is_none() && !self.state.expect_info {
            return Err(ClientError::Config(
                "no streams configured and no INFO request pending".to_owned(),
            ));
        }
        Ok(())
    }

    /// Consume the session and yield owned packets until it terminates.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = Result<OwnedPacket>> {
        crate::stream::packet_stream(self)
    }
}

/// Connect, say HELLO and hang up: a connectivity probe reporting the
/// server's identity.
pub async fn ping(addr: &str, iotimeout: Duration) -> Result<ServerInfo> {
    let (mut conn, server) = handshake(addr, iotimeout).await?;
    let _ = conn.send_command(&Command::Bye).await;
    let _ = conn.shutdown().await;
    Ok(server)
}

async fn handshake(addr: &str, iotimeout: Duration) -> Result<(Connection, ServerInfo)> {
    let mut conn = Connection::connect(addr, iotimeout).await?;
    conn.send_command(&Command::Hello).await?;
    let line1 = conn.read_line().await?;
    let line2 = conn.read_line().await?;
    let hello = HelloReply::parse(&line1, &line2)?;
    Ok((conn, hello.into()))
}
