// src/timeout/jacobson_karn.rs
//! Adaptive retransmission timeout per RFC 2988, with Karn's ambiguity rule.

use super::TimeoutPolicy;
use crate::config;
use crate::reliability::InFlightDgram;
use log::trace;
use std::time::{Duration, Instant};

/// Lower bound for the retransmission timeout, in milliseconds.
pub const RTO_MIN_MS: i32 = 1_000;
/// Upper bound for the retransmission timeout, in milliseconds.
pub const RTO_MAX_MS: i32 = 32_000;

const RTO_DEFAULT_MS: i32 = 3_000;
const RTTVAR_DEFAULT_MS: i32 = 750;

/// Per-peer round-trip estimator state, all values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRtt {
    /// Current retransmission timeout.
    pub rto: i32,
    /// Smoothed round-trip time.
    pub srtt: i32,
    /// Round-trip time variance estimate.
    pub rttvar: i32,
    /// True until the first RTT sample is taken.
    pub first: bool,
}

impl Default for PeerRtt {
    fn default() -> Self {
        Self {
            rto: RTO_DEFAULT_MS,
            srtt: 0,
            rttvar: RTTVAR_DEFAULT_MS,
            first: true,
        }
    }
}

/// Jacobson/Karn timeout policy.
///
/// Resend deadlines follow the peer's estimated RTO; the estimate is fed by
/// RTT samples from acks and backed off exponentially on every timeout.
#[derive(Debug, Default)]
pub struct JacobsonKarn;

impl TimeoutPolicy for JacobsonKarn {
    type PeerState = PeerRtt;

    fn next_deadline(&self, now: Instant, _entry: &InFlightDgram, peer: &mut PeerRtt) -> Instant {
        now + Duration::from_millis(peer.rto as u64)
    }

    fn retry_budget(&self, _peer: &mut PeerRtt) -> u32 {
        config::send_try_count()
    }

    fn on_ack_received(&self, now: Instant, entry: &InFlightDgram, peer: &mut PeerRtt) {
        // Karn's rule: with more than one transmission outstanding the ack
        // cannot be matched to a specific send, so the sample is discarded.
        if entry.send_count > 1 {
            return;
        }
        let rtt = now.duration_since(entry.base_time).as_millis() as i32;
        if peer.first {
            peer.first = false;
            peer.srtt = rtt;
            peer.rttvar = rtt >> 1;
        } else {
            peer.rttvar += ((peer.srtt - rtt).abs() - peer.rttvar) >> 2;
            peer.srtt += (rtt - peer.srtt) >> 3;
        }
        peer.rto = (peer.srtt + (peer.rttvar << 2)).clamp(RTO_MIN_MS, RTO_MAX_MS);

        trace!(
            "rtt sample {} ms: srtt={} rttvar={} rto={}",
            rtt, peer.srtt, peer.rttvar, peer.rto
        );
    }

    fn on_send_timeout(&self, _now: Instant, _entry: &InFlightDgram, peer: &mut PeerRtt) {
        peer.rto = (peer.rto * 2).min(RTO_MAX_MS);
        trace!("send timeout: rto backed off to {} ms", peer.rto);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "111.111.111.111:80".parse().unwrap()
    }

    fn sent_once(base: Instant) -> InFlightDgram {
        let mut entry = InFlightDgram::for_tests(0, b"1234", addr(), base);
        entry.send_count = 1;
        entry
    }

    #[test]
    fn initial_estimator_state() {
        let peer = PeerRtt::default();
        assert_eq!(peer.rto, 3_000);
        assert_eq!(peer.srtt, 0);
        assert_eq!(peer.rttvar, 750);
        assert!(peer.first);
    }

    #[test]
    fn first_sample_seeds_estimator() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();
        let entry = sent_once(base);

        policy.on_ack_received(base + Duration::from_millis(1_000), &entry, &mut peer);

        assert_eq!(peer.srtt, 1_000);
        assert_eq!(peer.rttvar, 500);
        assert_eq!(peer.rto, 3_000);
        assert!(!peer.first);
    }

    #[test]
    fn later_samples_use_ewma() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();

        policy.on_ack_received(base + Duration::from_millis(1_000), &sent_once(base), &mut peer);

        // Second sample, also 1000 ms: rttvar decays toward |srtt - rtt| = 0.
        let srtt = peer.srtt;
        let rttvar = peer.rttvar;
        policy.on_ack_received(base + Duration::from_millis(1_000), &sent_once(base), &mut peer);

        let exp_rttvar = rttvar + (((srtt - 1_000).abs() - rttvar) >> 2);
        let exp_srtt = srtt + ((1_000 - srtt) >> 3);
        assert_eq!(peer.rttvar, exp_rttvar);
        assert_eq!(peer.srtt, exp_srtt);
        assert_eq!(
            peer.rto,
            (exp_srtt + (exp_rttvar << 2)).clamp(RTO_MIN_MS, RTO_MAX_MS)
        );
    }

    #[test]
    fn ambiguous_ack_leaves_estimator_untouched() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();

        let mut entry = sent_once(base);
        entry.send_count = 2;

        let before = peer.clone();
        policy.on_ack_received(base + Duration::from_millis(1_000), &entry, &mut peer);
        assert_eq!(peer, before);
    }

    #[test]
    fn rto_doubles_on_timeout() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();

        let rto_initial = peer.rto;
        policy.on_send_timeout(base, &sent_once(base), &mut peer);
        assert_eq!(peer.rto, rto_initial * 2);
    }

    #[test]
    fn rto_doubling_capped_at_max() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();
        let entry = sent_once(base);

        loop {
            let previous = peer.rto;
            policy.on_send_timeout(base, &entry, &mut peer);
            assert!(peer.rto <= RTO_MAX_MS);
            if peer.rto == previous {
                break;
            }
        }
        assert_eq!(peer.rto, RTO_MAX_MS);
    }

    #[test]
    fn rto_clamped_to_minimum() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();

        // Instant acks: the raw estimate would collapse below one second.
        for _ in 0..10 {
            policy.on_ack_received(base, &sent_once(base), &mut peer);
        }
        assert_eq!(peer.rto, RTO_MIN_MS);
    }

    #[test]
    fn rto_clamped_to_maximum() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let base = Instant::now();

        for _ in 0..10 {
            policy.on_ack_received(base + Duration::from_millis(64_000), &sent_once(base), &mut peer);
        }
        assert_eq!(peer.rto, RTO_MAX_MS);
    }

    #[test]
    fn deadline_follows_peer_rto() {
        let policy = JacobsonKarn;
        let mut peer = PeerRtt::default();
        let now = Instant::now();
        let entry = sent_once(now);

        assert_eq!(
            policy.next_deadline(now, &entry, &mut peer),
            now + Duration::from_millis(3_000)
        );

        peer.rto = 8_000;
        assert_eq!(
            policy.next_deadline(now, &entry, &mut peer),
            now + Duration::from_millis(8_000)
        );
    }
}
