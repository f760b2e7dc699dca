//! Reliable-UDP echo server.
//!
//! Binds the address from `config.toml` and echoes every received payload
//! back to its sender, reliably. Control frames the transport consumes show
//! up as zero-byte reads and are ignored here.

use citrine::config;
use citrine_log::CitrineLogger;
use log::{Level, debug, info, trace, warn};
use seqwire::{ReliableDgram, TerminalOutcome};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const UDP_BUFFER_SIZE: usize = 65_536;

/// Ceiling for the receive timeout so the loop stays responsive even with
/// nothing in flight.
const IDLE_WAIT: Duration = Duration::from_secs(1);

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

    let mut sock = ReliableDgram::bind(&config.network.address)?;
    sock.set_terminal_callback(|outcome, _payload, addr| {
        if outcome != TerminalOutcome::Success {
            warn!("echo to {} ended with {:?}", addr, outcome);
        }
    });
    info!("echo server listening on {}", sock.local_addr()?);

    let mut buffer = [0u8; UDP_BUFFER_SIZE];
    loop {
        // Sleep at most until the next retransmission is due.
        let wait = match sock.next_wakeup() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .clamp(Duration::from_millis(1), IDLE_WAIT),
            None => IDLE_WAIT,
        };
        sock.socket().set_read_timeout(Some(wait))?;

        match sock.recv_from(&mut buffer) {
            Ok((received, from)) if received > 0 => {
                debug!("received {} bytes from {}", received, from);
                sock.send_to(&buffer[..received], from)?;
            }
            Ok((_, from)) => {
                trace!("zero-length payload from {}", from);
            }
            Err(seqwire::TransportError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                warn!("receive failed: {}", e);
            }
        }

        // Push out queued acks and any resends whose deadline lapsed.
        if sock.needs_to_send() {
            sock.flush()?;
        }
    }
}
