// src/lib.rs
//! Reliable datagram transport over UDP.
//!
//! Provides at-least-once delivery of individual datagrams to peers
//! addressed by IP and port: every outbound payload gets a sequence number
//! and a 5-byte header, the remote side acks each one, and unacknowledged
//! datagrams are retransmitted on an adaptive (or constant) timeout until a
//! bounded try budget runs out. Ordering is not guaranteed and duplicates
//! are possible; both are left to the application.
//!
//! The usual entry point is [`ReliableDgram`]:
//!
//! ```no_run
//! use seqwire::ReliableDgram;
//!
//! let mut sock = ReliableDgram::bind("0.0.0.0:0")?;
//! sock.send_to(b"hello", "127.0.0.1:4000".parse().unwrap())?;
//! # Ok::<(), seqwire::TransportError>(())
//! ```
//!
//! Retransmission timers are passive: they fire inside `send_to`, `flush`,
//! `recv_from` and `needs_to_send`, never on a background thread. Event
//! loops should wake at [`ReliableEndpoint::next_wakeup`] and call
//! [`ReliableEndpoint::flush`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod multi;
pub mod peer;
pub mod protocol;
pub mod reliability;
pub mod socket;
pub mod timeout;

pub use endpoint::ReliableEndpoint;
pub use error::{Result, TransportError};
pub use multi::SendMulti;
pub use reliability::TerminalOutcome;

use peer::{PeerMap, SharedPeer};
use timeout::{Constant, JacobsonKarn, PeerRtt};

/// Endpoint with the same resend interval for every peer, read from
/// [`config`].
pub type ConstantEndpoint = ReliableEndpoint<Constant, SharedPeer<()>>;

/// Endpoint that adapts its resend timeout to each peer's measured
/// round-trip time.
pub type AdaptiveEndpoint = ReliableEndpoint<JacobsonKarn, PeerMap<PeerRtt>>;

/// The default reliable datagram socket.
pub type ReliableDgram = AdaptiveEndpoint;
