//! Session negotiation: subscribing the configured streams after HELLO.

use slink_protocol::{Command, ProtocolVersion, Response};
use tracing::{debug, warn};

use crate::config::{BatchMode, SessionConfig};
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::streams::{StreamEntry, StreamRegistry};

/// Configure the link: optional `BATCH`, per-station subscription commands
/// and the final `END`, or the single session-scope command in uni-station
/// mode.
///
/// Any error returned here is a negotiation failure; the session
/// disconnects and retries after the reconnect delay.
pub(crate) async fn configure(
    conn: &mut Connection,
    config: &SessionConfig,
    streams: &StreamRegistry,
    version: ProtocolVersion,
    batch: &mut BatchMode,
) -> Result<()> {
    if config.batch && *batch == BatchMode::Off {
        *batch = BatchMode::Requested;
    }

    if *batch == BatchMode::Requested {
        negotiate_batch(conn, version, batch).await?;
    }

    if streams.is_uni() {
        let entry = &streams.entries()[0];
        configure_selectors(conn, entry, *batch).await?;

        let cmd = resume_command(config, entry);
        conn.send_command(&cmd).await?;
        if *batch != BatchMode::Active {
            match read_response(conn).await? {
                Response::Ok => {}
                Response::Error => {
                    return Err(ClientError::NegotiationFailed(format!(
                        "server refused {} in uni-station mode",
                        cmd.name()
                    )));
                }
            }
        }

        debug!("uni-station negotiation complete");
        return Ok(());
    }

    let mut accepted = 0usize;
    for entry in streams.entries() {
        if configure_station(conn, config, entry, *batch).await? {
            accepted += 1;
        } else {
            warn!(net = %entry.net, sta = %entry.sta, "station not accepted");
        }
    }

    if accepted == 0 {
        return Err(ClientError::NegotiationFailed(
            "no station accepted by the server".to_owned(),
        ));
    }

    conn.send_command(&Command::End).await?;
    debug!(accepted, "negotiation complete, streaming");

    Ok(())
}

async fn negotiate_batch(
    conn: &mut Connection,
    version: ProtocolVersion,
    batch: &mut BatchMode,
) -> Result<()> {
    if let Some(required) = Command::Batch.requires()
        && !version.at_least(required)
    {
        debug!(%version, "server too old for BATCH, staying in plain mode");
        *batch = BatchMode::Off;
        return Ok(());
    }

    conn.send_command(&Command::Batch).await?;
    match read_response(conn).await? {
        Response::Ok => {
            debug!("batch command mode activated");
            *batch = BatchMode::Active;
        }
        Response::Error => {
            warn!("server refused BATCH, staying in plain mode");
            *batch = BatchMode::Off;
        }
    }

    Ok(())
}

/// Subscribe one station. Returns whether the server accepted it; an `Err`
/// aborts the whole negotiation.
async fn configure_station(
    conn: &mut Connection,
    config: &SessionConfig,
    entry: &StreamEntry,
    batch: BatchMode,
) -> Result<bool> {
    let cmd = Command::Station {
        station: entry.sta.clone(),
        network: entry.net.clone(),
    };
    conn.send_command(&cmd).await?;
    if batch != BatchMode::Active {
        match read_response(conn).await? {
            Response::Ok => {}
            Response::Error => return Ok(false),
        }
    }

    configure_selectors(conn, entry, batch).await?;

    let cmd = resume_command(config, entry);
    conn.send_command(&cmd).await?;
    if batch != BatchMode::Active {
        match read_response(conn).await? {
            Response::Ok => {}
            Response::Error => return Ok(false),
        }
    }

    Ok(true)
}

/// Send one `SELECT` per selector. A refused selector is skipped, not fatal.
async fn configure_selectors(
    conn: &mut Connection,
    entry: &StreamEntry,
    batch: BatchMode,
) -> Result<()> {
    let Some(selectors) = entry.selectors.as_deref() else {
        return Ok(());
    };

    for selector in selectors.split_whitespace() {
        let cmd = Command::Select {
            pattern: selector.to_owned(),
        };
        conn.send_command(&cmd).await?;
        if batch != BatchMode::Active
            && read_response(conn).await? == Response::Error
        {
            warn!(selector, net = %entry.net, sta = %entry.sta, "selector refused");
        }
    }

    Ok(())
}

/// Build the per-station resume command.
///
/// An explicit time window wins; otherwise dial-up sessions use `FETCH` and
/// streaming sessions `DATA`. Resumption restarts one past the last
/// delivered sequence, with the last packet time attached when configured.
fn resume_command(config: &SessionConfig, entry: &StreamEntry) -> Command {
    if let Some(begin) = config.begin_time.clone() {
        return Command::Time {
            start: begin,
            end: config.end_time.clone(),
        };
    }

    let sequence = if config.resume {
        entry.seqnum.map(|seq| seq.next())
    } else {
        None
    };
    let timestamp = if config.lastpkttime {
        entry.timestamp.clone()
    } else {
        None
    };

    if config.dialup {
        Command::Fetch {
            sequence,
            timestamp,
        }
    } else {
        Command::Data {
            sequence,
            timestamp,
        }
    }
}

async fn read_response(conn: &mut Connection) -> Result<Response> {
    let line = conn.read_line().await?;
    Response::parse_line(&line)
        .map_err(|_| ClientError::UnexpectedResponse(format!("{:?}", line.trim_end())))
}
