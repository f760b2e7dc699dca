// src/timeout/constant.rs
use super::TimeoutPolicy;
use crate::config;
use crate::reliability::InFlightDgram;
use std::time::Instant;

/// Constant timeout policy: every peer gets the same resend interval and
/// retry budget, both read from the process-wide config on each use.
#[derive(Debug, Default)]
pub struct Constant;

impl TimeoutPolicy for Constant {
    type PeerState = ();

    fn next_deadline(&self, now: Instant, _entry: &InFlightDgram, _peer: &mut ()) -> Instant {
        now + config::timeout()
    }

    fn retry_budget(&self, _peer: &mut ()) -> u32 {
        config::send_try_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use crate::reliability::InFlightDgram;
    use std::time::Duration;

    fn entry(now: Instant) -> InFlightDgram {
        InFlightDgram::for_tests(0, b"1234", "127.0.0.1:80".parse().unwrap(), now)
    }

    #[test]
    fn deadline_tracks_config_timeout() {
        let _guard = test_support::lock();
        config::set_timeout(Duration::from_secs(2));

        let now = Instant::now();
        let policy = Constant;
        assert_eq!(
            policy.next_deadline(now, &entry(now), &mut ()),
            now + Duration::from_secs(2)
        );
    }

    #[test]
    fn budget_tracks_config_try_count() {
        let _guard = test_support::lock();
        config::set_send_try_count(3);

        let policy = Constant;
        assert_eq!(policy.retry_budget(&mut ()), 3);
    }
}
