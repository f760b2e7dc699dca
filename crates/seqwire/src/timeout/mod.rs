// src/timeout/mod.rs
//! Retransmission timeout policies.
//!
//! A policy decides when an unacknowledged datagram should be resent and
//! how many transmissions it is granted, and may maintain per-peer state
//! (borrowed from a [`PeerContainer`](crate::peer::PeerContainer)) that is
//! updated as acks arrive and timeouts fire.

use crate::reliability::InFlightDgram;
use std::time::Instant;

mod constant;
mod jacobson_karn;

pub use constant::Constant;
pub use jacobson_karn::{JacobsonKarn, PeerRtt, RTO_MAX_MS, RTO_MIN_MS};

/// Timeout and retry policy for in-flight datagrams.
pub trait TimeoutPolicy {
    /// Per-peer state this policy maintains.
    type PeerState: Default;

    /// The deadline after which `entry` should be scheduled for resend.
    fn next_deadline(
        &self,
        now: Instant,
        entry: &InFlightDgram,
        peer: &mut Self::PeerState,
    ) -> Instant;

    /// Total transmissions allowed per datagram (first send + retries).
    fn retry_budget(&self, peer: &mut Self::PeerState) -> u32;

    /// Called after every successful transmission of `entry`.
    fn on_packet_sent(&self, _now: Instant, _entry: &InFlightDgram, _peer: &mut Self::PeerState) {}

    /// Called when an ack arrives for `entry`, before the entry is dropped.
    fn on_ack_received(&self, _now: Instant, _entry: &InFlightDgram, _peer: &mut Self::PeerState) {}

    /// Called when `entry`'s resend deadline expires without an ack.
    fn on_send_timeout(&self, _now: Instant, _entry: &InFlightDgram, _peer: &mut Self::PeerState) {}
}
