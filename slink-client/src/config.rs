use std::time::Duration;

/// Default SeedLink server address.
pub const DEFAULT_ADDRESS: &str = "localhost:18000";

/// Configuration for a [`SeedLinkSession`](crate::SeedLinkSession).
///
/// The intervals mirror the knobs of classic SeedLink clients: an I/O
/// timeout for individual network operations, a network-idle timeout that
/// forces a reconnect when the server goes quiet, a reconnect delay between
/// connection attempts, and an optional keepalive interval.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Server `host:port`. Default: `localhost:18000`.
    pub address: String,
    /// Start of an explicit time window (`YYYY,MM,DD,hh,mm,ss`). When set,
    /// subscriptions are negotiated with `TIME` instead of `DATA`/`FETCH`.
    pub begin_time: Option<String>,
    /// End of the time window; only meaningful with `begin_time`.
    pub end_time: Option<String>,
    /// Resume from tracked sequence numbers on reconnect. Default: `true`.
    pub resume: bool,
    /// Dial-up mode: negotiate with `FETCH` so the server closes once its
    /// buffer is drained. Default: `false`.
    pub dialup: bool,
    /// Append the last packet time to resume commands. Default: `true`.
    pub lastpkttime: bool,
    /// Request batch command mode during negotiation. Default: `false`.
    pub batch: bool,
    /// Keepalive interval; zero disables keepalives. Default: disabled.
    pub keepalive: Duration,
    /// Timeout for individual network I/O operations. Default: 60 seconds.
    pub iotimeout: Duration,
    /// Network-idle timeout; zero disables it. Default: 600 seconds.
    pub netto: Duration,
    /// Delay between reconnect attempts. Default: 30 seconds.
    pub netdly: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            begin_time: None,
            end_time: None,
            resume: true,
            dialup: false,
            lastpkttime: true,
            batch: false,
            keepalive: Duration::ZERO,
            iotimeout: Duration::from_secs(60),
            netto: Duration::from_secs(600),
            netdly: Duration::from_secs(30),
        }
    }
}

/// Batch command mode negotiation state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Not requested, or refused by the server.
    #[default]
    Off,
    /// Requested in the configuration, not yet negotiated.
    Requested,
    /// Server accepted `BATCH`; negotiation commands are pipelined without
    /// individual responses.
    Active,
}
