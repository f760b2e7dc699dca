//! Reliable-UDP echo client.
//!
//! Reads lines from stdin, sends each to the echo server from
//! `config.toml`, and waits for the echo to come back. The wait loop keeps
//! flushing the transport so acks go out and retransmits fire on time.

use citrine::config;
use citrine_log::CitrineLogger;
use log::{Level, debug, info, warn};
use seqwire::{ReliableDgram, TerminalOutcome};
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const UDP_BUFFER_SIZE: usize = 65_536;

const IDLE_WAIT: Duration = Duration::from_secs(1);

/// How long to wait for the echo before giving up on it.
const ECHO_WAIT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::error::ConfigError),
    #[error("transport error: {0}")]
    Transport(#[from] seqwire::TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, AppError>;

fn main() -> Result<()> {
    CitrineLogger::init(Level::Info).expect("logger already installed");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = config::handle(&config_path)?;
    config.apply_transport();

    let server: SocketAddr = config
        .network
        .address
        .parse()
        .expect("config validation guarantees a socket address");

    let mut sock = ReliableDgram::bind("0.0.0.0:0")?;
    sock.set_terminal_callback(move |outcome, _payload, addr| match outcome {
        TerminalOutcome::Success => debug!("datagram to {} acknowledged", addr),
        other => warn!("datagram to {} ended with {:?}", addr, other),
    });
    info!("echo client talking to {}", server);

    let mut buffer = [0u8; UDP_BUFFER_SIZE];
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        sock.send_to(line.as_bytes(), server)?;
        match wait_for_echo(&mut sock, &mut buffer)? {
            Some(received) => {
                info!("echo: {}", String::from_utf8_lossy(&buffer[..received]));
            }
            None => warn!("no echo within {:?}", ECHO_WAIT),
        }
    }

    Ok(())
}

/// Receives until a payload arrives, flushing pending acks and resends in
/// between. Returns `None` when the overall deadline passes first.
fn wait_for_echo(sock: &mut ReliableDgram, buffer: &mut [u8]) -> Result<Option<usize>> {
    let give_up = Instant::now() + ECHO_WAIT;
    loop {
        let now = Instant::now();
        if now >= give_up {
            return Ok(None);
        }
        let wait = match sock.next_wakeup() {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => IDLE_WAIT,
        }
        .min(give_up - now)
        .max(Duration::from_millis(1));
        sock.socket().set_read_timeout(Some(wait))?;

        match sock.recv_from(buffer) {
            Ok((received, _)) if received > 0 => return Ok(Some(received)),
            Ok(_) => {}
            Err(seqwire::TransportError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => return Err(e.into()),
        }

        if sock.needs_to_send() {
            sock.flush()?;
        }
    }
}
