//! In-process SeedLink server for exercising the session state machine.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;

pub(crate) struct MockConfig {
    pub hello_line1: String,
    pub hello_line2: String,
    /// Reply OK to BATCH; ERROR otherwise.
    pub accept_batch: bool,
    /// Station codes answered with ERROR.
    pub station_errors: Vec<String>,
    /// Selector patterns answered with ERROR.
    pub select_errors: Vec<String>,
    /// Reply ERROR to DATA/FETCH/TIME.
    pub data_error: bool,
    /// Frames streamed after END (or DATA in uni mode).
    pub frames: Vec<Vec<u8>>,
    /// Per-connection frame scripts, overriding `frames`.
    pub connection_frames: Option<Vec<Vec<Vec<u8>>>>,
    /// Raw bytes written after the frames (e.g. `b"END"`).
    pub trailer: Option<Vec<u8>>,
    /// Frames written in response to INFO.
    pub info_frames: Vec<Vec<u8>>,
    /// Start streaming after the DATA/FETCH/TIME reply (uni-station mode).
    pub stream_after_data: bool,
    /// Close the connection once the stream script is written.
    pub close_after_stream: bool,
    pub max_connections: usize,
}

impl MockConfig {
    pub fn v3_default(frames: Vec<Vec<u8>>) -> Self {
        Self {
            hello_line1: "SeedLink v3.1 SL-test".to_owned(),
            hello_line2: "TESTSERVER".to_owned(),
            accept_batch: true,
            station_errors: Vec::new(),
            select_errors: Vec::new(),
            data_error: false,
            frames,
            connection_frames: None,
            trailer: None,
            info_frames: Vec::new(),
            stream_after_data: false,
            close_after_stream: false,
            max_connections: 1,
        }
    }
}

pub(crate) struct MockServer {
    addr: SocketAddr,
    captured: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let log = captured.clone();
        tokio::spawn(async move {
            for idx in 0..config.max_connections {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                log.lock().unwrap().push(Vec::new());
                handle_connection(stream, &config, idx, &log).await;
            }
        });

        Self { addr, captured }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The command transcript of connection `idx`.
    pub fn commands(&self, idx: usize) -> Vec<String> {
        self.captured
            .lock()
            .unwrap()
            .get(idx)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.captured.lock().unwrap().len()
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    config: &MockConfig,
    idx: usize,
    log: &Arc<Mutex<Vec<Vec<String>>>>,
) {
    let (read_half, mut write) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let mut batch_active = false;

    let frames = config
        .connection_frames
        .as_ref()
        .and_then(|scripts| scripts.get(idx))
        .unwrap_or(&config.frames);

    loop {
        line.clear();
        let n = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(_) => return,
        };
        if n == 0 {
            return;
        }

        let trimmed = line.trim().to_owned();
        log.lock().unwrap()[idx].push(trimmed.clone());
        let upper = trimmed.to_uppercase();
        let mut fields = upper.split_whitespace();
        let keyword = fields.next().unwrap_or_default().to_owned();
        let first_arg = fields.next().unwrap_or_default().to_owned();

        match keyword.as_str() {
            "HELLO" => {
                let banner = format!("{}\r\n{}\r\n", config.hello_line1, config.hello_line2);
                if write.write_all(banner.as_bytes()).await.is_err() {
                    return;
                }
            }
            "BATCH" => {
                // BATCH itself is always answered
                let reply: &[u8] = if config.accept_batch {
                    batch_active = true;
                    b"OK\r\n"
                } else {
                    b"ERROR\r\n"
                };
                if write.write_all(reply).await.is_err() {
                    return;
                }
            }
            "STATION" => {
                let accept = !config.station_errors.contains(&first_arg);
                if !batch_active && respond(&mut write, accept).await.is_err() {
                    return;
                }
            }
            "SELECT" => {
                let accept = !config.select_errors.contains(&first_arg);
                if !batch_active && respond(&mut write, accept).await.is_err() {
                    return;
                }
            }
            "DATA" | "FETCH" | "TIME" => {
                if !batch_active && respond(&mut write, !config.data_error).await.is_err() {
                    return;
                }
                if config.stream_after_data && !config.data_error {
                    if stream_script(&mut write, frames, config).await.is_err() {
                        return;
                    }
                    if config.close_after_stream {
                        return;
                    }
                }
            }
            "END" => {
                if stream_script(&mut write, frames, config).await.is_err() {
                    return;
                }
                if config.close_after_stream {
                    return;
                }
            }
            "INFO" => {
                for frame in &config.info_frames {
                    if write.write_all(frame).await.is_err() {
                        return;
                    }
                }
                let _ = write.flush().await;
            }
            "BYE" => {
                let _ = write.shutdown().await;
                return;
            }
            _ => {}
        }

        let _ = write.flush().await;
    }
}

async fn respond(write: &mut OwnedWriteHalf, ok: bool) -> std::io::Result<()> {
    write
        .write_all(if ok { b"OK\r\n" } else { b"ERROR\r\n" })
        .await
}

async fn stream_script(
    write: &mut OwnedWriteHalf,
    frames: &[Vec<u8>],
    config: &MockConfig,
) -> std::io::Result<()> {
    for frame in frames {
        write.write_all(frame).await?;
    }
    if let Some(trailer) = &config.trailer {
        write.write_all(trailer).await?;
    }
    write.flush().await
}

// -- Test record builders --

/// A valid 512-byte miniSEED 2 record with a blockette 1000.
pub(crate) fn ms2_record(station: &str, network: &str) -> Vec<u8> {
    let mut rec = vec![0u8; 512];
    rec[..6].copy_from_slice(b"000001");
    rec[6] = b'D';
    rec[7] = b' ';

    let mut sta = [b' '; 5];
    sta[..station.len().min(5)].copy_from_slice(&station.as_bytes()[..station.len().min(5)]);
    rec[8..13].copy_from_slice(&sta);
    rec[13..15].copy_from_slice(b"  ");
    rec[15..18].copy_from_slice(b"BHZ");

    let mut net = [b' '; 2];
    net[..network.len().min(2)].copy_from_slice(&network.as_bytes()[..network.len().min(2)]);
    rec[18..20].copy_from_slice(&net);

    rec[20..22].copy_from_slice(&2024u16.to_be_bytes());
    rec[22..24].copy_from_slice(&1u16.to_be_bytes());
    rec[30..32].copy_from_slice(&100u16.to_be_bytes());
    rec[32..34].copy_from_slice(&20u16.to_be_bytes());
    rec[34..36].copy_from_slice(&1u16.to_be_bytes());
    rec[44..46].copy_from_slice(&64u16.to_be_bytes());
    rec[46..48].copy_from_slice(&48u16.to_be_bytes());

    rec[48..50].copy_from_slice(&1000u16.to_be_bytes());
    rec[50..52].copy_from_slice(&0u16.to_be_bytes());
    rec[52] = 10;
    rec[53] = 1;
    rec[54] = 9; // 2^9 = 512

    rec
}

/// Frame a record as a SeedLink data packet.
pub(crate) fn data_frame(seq: u32, record: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + record.len());
    frame.extend_from_slice(b"SL");
    frame.extend_from_slice(format!("{seq:06X}").as_bytes());
    frame.extend_from_slice(record);
    frame
}

/// A framed data packet for `station`/`network` with sequence `seq`.
pub(crate) fn make_frame(seq: u32, station: &str, network: &str) -> Vec<u8> {
    data_frame(seq, &ms2_record(station, network))
}

/// Frame a record as part of an INFO response.
pub(crate) fn info_frame(more: bool, record: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + record.len());
    frame.extend_from_slice(b"SLINFO");
    frame.push(b' ');
    frame.push(if more { b'*' } else { b' ' });
    frame.extend_from_slice(record);
    frame
}

/// A plausible INFO response record (a miniSEED log record).
pub(crate) fn info_record() -> Vec<u8> {
    let mut rec = ms2_record("INFO", "SL");
    rec[32..34].copy_from_slice(&0u16.to_be_bytes()); // log records carry no rate
    rec
}
