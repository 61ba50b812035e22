use std::time::Duration;

use slink_protocol::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

/// How long one blocking-mode read waits for the socket to become readable.
pub(crate) const READ_WAIT: Duration = Duration::from_millis(500);

/// Longest accepted response line; real ones are a few dozen bytes.
const MAX_LINE: usize = 512;

/// A TCP connection to a SeedLink server.
///
/// Response lines are read one byte at a time so that no buffered reader
/// can swallow the start of the binary packet stream; once streaming
/// begins, reads go straight into the session's receive buffer.
pub(crate) struct Connection {
    stream: TcpStream,
    iotimeout: Duration,
}

impl Connection {
    /// Open a TCP connection, bounded by `iotimeout`.
    pub async fn connect(addr: &str, iotimeout: Duration) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = tokio::time::timeout(iotimeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(iotimeout))??;

        stream.set_nodelay(true).ok();

        Ok(Self { stream, iotimeout })
    }

    /// Send one CRLF-terminated command line.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<()> {
        trace!(command = %cmd, "sending");
        let bytes = cmd.to_bytes();
        tokio::time::timeout(self.iotimeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| ClientError::Timeout(self.iotimeout))??;
        Ok(())
    }

    /// Read a single response line, including its terminator.
    pub async fn read_line(&mut self) -> Result<String> {
        let iotimeout = self.iotimeout;
        let stream = &mut self.stream;

        tokio::time::timeout(iotimeout, async move {
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let n = stream.read(&mut byte).await?;
                if n == 0 {
                    return Err(ClientError::Disconnected);
                }
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
                if line.len() >= MAX_LINE {
                    return Err(ClientError::UnexpectedResponse(
                        "response line too long".to_owned(),
                    ));
                }
            }
            String::from_utf8(line)
                .map_err(|_| ClientError::UnexpectedResponse("response is not UTF-8".to_owned()))
        })
        .await
        .map_err(|_| ClientError::Timeout(iotimeout))?
    }

    /// Read available bytes into `buf`, waiting up to [`READ_WAIT`] for the
    /// socket to produce data. `Ok(None)` means nothing arrived in time.
    pub async fn recv_ready(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        match tokio::time::timeout(READ_WAIT, self.stream.read(buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(ClientError::Disconnected),
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(err)) => Err(err.into()),
        }
    }

    /// Read available bytes into `buf` without waiting at all.
    pub fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.stream.try_read(buf) {
            Ok(0) => Err(ClientError::Disconnected),
            Ok(n) => Ok(Some(n)),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Shut down the write side, signalling the server we are done.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
