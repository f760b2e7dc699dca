// src/reliability/engine.rs
use crate::error::{Result, TransportError};
use crate::peer::PeerContainer;
use crate::protocol::{DgramInfo, DgramKind};
use crate::timeout::TimeoutPolicy;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

/// Final disposition of a registered USER datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// The peer acknowledged the datagram.
    Success,
    /// The transmission budget was exhausted without an ack.
    Timeout,
    /// The socket refused the send with a non-transient error.
    Failure,
}

/// Callback invoked exactly once per registered USER datagram when its fate
/// is decided. The payload is attached only for [`TerminalOutcome::Failure`];
/// for the other outcomes the buffer is no longer retained.
pub type TerminalCallback = Box<dyn FnMut(TerminalOutcome, Option<&[u8]>, SocketAddr) + Send>;

/// A registered outbound datagram awaiting its ack.
#[derive(Debug)]
pub struct InFlightDgram {
    pub sequence: u32,
    pub payload: Bytes,
    pub addr: SocketAddr,
    /// Number of successful socket writes so far. A deferred datagram sits
    /// at zero until its first actual transmission.
    pub send_count: u32,
    /// Time of the first send attempt. Never updated on resend, so an RTT
    /// sample against it is only unambiguous while `send_count == 1`.
    pub base_time: Instant,
}

impl InFlightDgram {
    #[cfg(test)]
    pub(crate) fn for_tests(
        sequence: u32,
        payload: &[u8],
        addr: SocketAddr,
        base_time: Instant,
    ) -> Self {
        Self {
            sequence,
            payload: Bytes::copy_from_slice(payload),
            addr,
            send_count: 0,
            base_time,
        }
    }
}

/// An ack owed to a peer for a received USER frame.
#[derive(Debug)]
struct PendingAck {
    sequence: u32,
    addr: SocketAddr,
}

/// Scheduled resend check for an in-flight sequence. Entries are never
/// removed eagerly; ones whose sequence has already settled are dropped
/// when they surface.
#[derive(Debug, PartialEq, Eq)]
struct TimeoutEntry {
    sequence: u32,
    deadline: Instant,
}

impl Ord for TimeoutEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Inverted: BinaryHeap is a max-heap, we want the earliest deadline
        // on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimeoutEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A frame pulled from the engine's queues, ready for the wire.
#[derive(Debug)]
pub struct QueuedFrame {
    pub payload: Bytes,
    pub addr: SocketAddr,
    pub info: DgramInfo,
}

/// The reliability engine.
///
/// Owns the sequence counter, the in-flight table, and the three queues
/// (pending acks, resends, timeout deadlines). All state changes happen on
/// the caller's thread: the engine schedules nothing itself, and expired
/// deadlines only take effect when the caller next drains it. The caller
/// reports every socket write back through [`on_send_success`] or
/// [`on_send_failure`] so queue heads are popped exactly when their frame
/// actually left (or terminally failed to leave) the process.
///
/// [`on_send_success`]: AckResendEngine::on_send_success
/// [`on_send_failure`]: AckResendEngine::on_send_failure
pub struct AckResendEngine<T, P>
where
    T: TimeoutPolicy,
    P: PeerContainer<T::PeerState>,
{
    next_sequence: u32,
    in_flight: BTreeMap<u32, InFlightDgram>,
    queue_ack: VecDeque<PendingAck>,
    queue_resend: VecDeque<u32>,
    queue_timeout: BinaryHeap<TimeoutEntry>,
    policy: T,
    peers: P,
    on_terminal: Option<TerminalCallback>,
}

impl<T, P> Default for AckResendEngine<T, P>
where
    T: TimeoutPolicy + Default,
    P: PeerContainer<T::PeerState>,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, P> AckResendEngine<T, P>
where
    T: TimeoutPolicy,
    P: PeerContainer<T::PeerState>,
{
    pub fn new(policy: T) -> Self {
        Self {
            next_sequence: 0,
            in_flight: BTreeMap::new(),
            queue_ack: VecDeque::new(),
            queue_resend: VecDeque::new(),
            queue_timeout: BinaryHeap::new(),
            policy,
            peers: P::default(),
            on_terminal: None,
        }
    }

    /// Sets the terminal-outcome callback.
    pub fn set_terminal_callback<F>(&mut self, callback: F)
    where
        F: FnMut(TerminalOutcome, Option<&[u8]>, SocketAddr) + Send + 'static,
    {
        self.on_terminal = Some(Box::new(callback));
    }

    /// Assigns a sequence number to a new outbound USER datagram.
    ///
    /// Nothing is retained yet; the payload is copied only once the send
    /// result is reported back. Acks never pass through here: they echo the
    /// acknowledged sequence and do not consume one.
    pub fn register_new(&mut self, dst: SocketAddr) -> DgramInfo {
        let info = DgramInfo::new(DgramKind::User, self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        trace!("assigned sequence {} to datagram for {}", info.sequence, dst);
        info
    }

    /// Records a successful socket write of the frame described by `info`.
    ///
    /// Returns the number of payload bytes handed to the wire.
    pub fn on_send_success(
        &mut self,
        payload: &[u8],
        dst: SocketAddr,
        info: &DgramInfo,
        now: Instant,
    ) -> Result<usize> {
        match (info.kind, info.resend) {
            (DgramKind::Ack, _) => self.sent_ack(info),
            (DgramKind::User, false) => self.sent_user(payload, dst, info, now),
            (DgramKind::User, true) => self.sent_resend(info, now),
        }?;
        Ok(payload.len())
    }

    fn sent_ack(&mut self, info: &DgramInfo) -> Result<()> {
        let Some(head) = self.queue_ack.front() else {
            return Err(TransportError::UnexpectedState(
                "ack sent with empty ack queue".into(),
            ));
        };
        if head.sequence != info.sequence {
            return Err(TransportError::UnexpectedState(format!(
                "ack sequence mismatch: sent {}, queued {}",
                info.sequence, head.sequence
            )));
        }
        trace!("ack for seq {} sent, removing from queue", info.sequence);
        self.queue_ack.pop_front();
        Ok(())
    }

    fn sent_user(
        &mut self,
        payload: &[u8],
        dst: SocketAddr,
        info: &DgramInfo,
        now: Instant,
    ) -> Result<()> {
        if self.in_flight.contains_key(&info.sequence) {
            return Err(TransportError::UnexpectedState(format!(
                "sequence {} already in flight",
                info.sequence
            )));
        }
        let entry = InFlightDgram {
            sequence: info.sequence,
            payload: Bytes::copy_from_slice(payload),
            addr: dst,
            send_count: 1,
            base_time: now,
        };
        let peer = self.peers.get_or_default(dst);
        self.policy.on_packet_sent(now, &entry, peer);
        let deadline = self.policy.next_deadline(now, &entry, peer);
        self.queue_timeout.push(TimeoutEntry {
            sequence: info.sequence,
            deadline,
        });
        self.in_flight.insert(info.sequence, entry);
        Ok(())
    }

    fn sent_resend(&mut self, info: &DgramInfo, now: Instant) -> Result<()> {
        let Some(entry) = self.in_flight.get_mut(&info.sequence) else {
            return Err(TransportError::UnexpectedState(format!(
                "resent sequence {} not in flight",
                info.sequence
            )));
        };
        entry.send_count += 1;
        trace!(
            "send count for seq {} now {}",
            info.sequence, entry.send_count
        );
        let peer = self.peers.get_or_default(entry.addr);
        self.policy.on_packet_sent(now, entry, peer);
        let deadline = self.policy.next_deadline(now, entry, peer);
        self.queue_timeout.push(TimeoutEntry {
            sequence: info.sequence,
            deadline,
        });
        if self.queue_resend.front() != Some(&info.sequence) {
            return Err(TransportError::UnexpectedState(format!(
                "resend queue head does not match sent sequence {}",
                info.sequence
            )));
        }
        self.queue_resend.pop_front();
        Ok(())
    }

    /// Records a failed socket write of the frame described by `info`.
    ///
    /// Returns `Some(len)` when the failure was absorbed and the caller
    /// should treat the send as successful (transient back-pressure on a
    /// first transmission: the payload is copied and queued for resend).
    /// Returns `None` when the send stays failed; a terminal FAILURE is
    /// reported here if the datagram is now lost.
    pub fn on_send_failure(
        &mut self,
        payload: &[u8],
        dst: SocketAddr,
        info: &DgramInfo,
        error: &io::Error,
        now: Instant,
    ) -> Option<usize> {
        let would_block = error.kind() == io::ErrorKind::WouldBlock;
        match (info.kind, info.resend) {
            (DgramKind::Ack, _) => {
                // Best effort: the peer retransmits and another ack gets
                // queued, so a lost ack heals on its own. Discard it here,
                // or the drain would keep re-offering the same ack.
                trace!("ack send to {} failed ({}), dropping", dst, error);
                self.queue_ack.pop_front();
                None
            }
            (DgramKind::User, false) if would_block => {
                debug!(
                    "send of seq {} to {} blocked, deferring to resend queue (len {})",
                    info.sequence,
                    dst,
                    self.queue_resend.len() + 1
                );
                let entry = InFlightDgram {
                    sequence: info.sequence,
                    payload: Bytes::copy_from_slice(payload),
                    addr: dst,
                    send_count: 0,
                    base_time: now,
                };
                self.in_flight.insert(info.sequence, entry);
                self.queue_resend.push_back(info.sequence);
                // Queued for transmission at the next drain; the caller must
                // not send the payload again itself.
                Some(payload.len())
            }
            (DgramKind::User, false) => {
                debug!("send of seq {} to {} failed: {}", info.sequence, dst, error);
                self.fire_terminal(TerminalOutcome::Failure, Some(payload), dst);
                None
            }
            (DgramKind::User, true) if would_block => {
                trace!(
                    "resend of seq {} blocked, left queued for the next drain",
                    info.sequence
                );
                None
            }
            (DgramKind::User, true) => {
                debug!(
                    "resend of seq {} to {} failed ({}), removing from queues",
                    info.sequence, dst, error
                );
                if self.queue_resend.front() == Some(&info.sequence) {
                    self.queue_resend.pop_front();
                } else {
                    warn!(
                        "resend queue head does not match failed sequence {}",
                        info.sequence
                    );
                }
                if let Some(entry) = self.in_flight.remove(&info.sequence) {
                    self.fire_terminal(TerminalOutcome::Failure, Some(payload), entry.addr);
                }
                None
            }
        }
    }

    /// Routes one decoded inbound frame.
    ///
    /// Returns the number of payload bytes that belong to the application:
    /// the payload length for USER frames, 0 for consumed acks.
    pub fn on_received(
        &mut self,
        payload: &[u8],
        src: SocketAddr,
        info: &DgramInfo,
        now: Instant,
    ) -> usize {
        match info.kind {
            DgramKind::Ack => {
                self.received_ack(src, info, now);
                0
            }
            DgramKind::User => {
                self.queue_ack.push_back(PendingAck {
                    sequence: info.sequence,
                    addr: src,
                });
                trace!(
                    "scheduling ack to {} for seq {}, ack queue now {}",
                    src,
                    info.sequence,
                    self.queue_ack.len()
                );
                payload.len()
            }
        }
    }

    fn received_ack(&mut self, src: SocketAddr, info: &DgramInfo, now: Instant) {
        match self.in_flight.remove(&info.sequence) {
            None => {
                warn!(
                    "ack from {} for unknown sequence {}, ignoring",
                    src, info.sequence
                );
            }
            Some(entry) => {
                let peer = self.peers.get_or_default(entry.addr);
                self.policy.on_ack_received(now, &entry, peer);
                debug!(
                    "ack from {} settled seq {}, awaiting acks for {} datagrams",
                    src,
                    info.sequence,
                    self.in_flight.len()
                );
                self.fire_terminal(TerminalOutcome::Success, None, entry.addr);
            }
        }
    }

    /// Returns the next frame owed to the wire, if any.
    ///
    /// Strict priority: pending acks first, then due resends. The frame is
    /// not popped from its queue here; report the write result through
    /// [`on_send_success`](Self::on_send_success) /
    /// [`on_send_failure`](Self::on_send_failure) to settle it.
    pub fn drain_ready(&mut self, now: Instant) -> Option<QueuedFrame> {
        if !self.has_pending_send(now) {
            return None;
        }
        if let Some(ack) = self.queue_ack.front() {
            trace!("queue head: ack to {} for seq {}", ack.addr, ack.sequence);
            return Some(QueuedFrame {
                payload: Bytes::new(),
                addr: ack.addr,
                info: DgramInfo {
                    kind: DgramKind::Ack,
                    sequence: ack.sequence,
                    resend: false,
                },
            });
        }
        let seq = *self.queue_resend.front()?;
        let entry = self.in_flight.get(&seq)?;
        trace!("queue head: resend of seq {} to {}", seq, entry.addr);
        Some(QueuedFrame {
            payload: entry.payload.clone(),
            addr: entry.addr,
            info: DgramInfo {
                kind: DgramKind::User,
                sequence: seq,
                resend: true,
            },
        })
    }

    /// True when queued work (acks or due resends) is waiting for a send.
    ///
    /// Walks the timeout heap first, promoting expired entries into the
    /// resend queue, then gives up on resends whose transmission budget is
    /// spent.
    pub fn has_pending_send(&mut self, now: Instant) -> bool {
        self.promote_expired(now);
        self.purge_exhausted();
        !self.queue_ack.is_empty() || !self.queue_resend.is_empty()
    }

    fn promote_expired(&mut self, now: Instant) {
        while self.queue_timeout.peek().is_some_and(|top| top.deadline <= now) {
            let Some(expired) = self.queue_timeout.pop() else {
                break;
            };
            match self.in_flight.get(&expired.sequence) {
                None => {
                    trace!("dropping stale timeout entry for seq {}", expired.sequence);
                }
                Some(entry) => {
                    let peer = self.peers.get_or_default(entry.addr);
                    self.policy.on_send_timeout(now, entry, peer);
                    trace!("seq {} timed out, scheduling resend", expired.sequence);
                    self.queue_resend.push_back(expired.sequence);
                }
            }
        }
    }

    fn purge_exhausted(&mut self) {
        while let Some(&seq) = self.queue_resend.front() {
            let Some(entry) = self.in_flight.get(&seq) else {
                trace!("discarding resend entry for settled seq {}", seq);
                self.queue_resend.pop_front();
                continue;
            };
            let addr = entry.addr;
            let send_count = entry.send_count;
            let budget = self.policy.retry_budget(self.peers.get_or_default(addr));
            if send_count < budget {
                break;
            }
            debug!(
                "seq {} sent {} times without a reply, giving up",
                seq, send_count
            );
            self.queue_resend.pop_front();
            self.in_flight.remove(&seq);
            self.fire_terminal(TerminalOutcome::Timeout, None, addr);
        }
    }

    /// Earliest scheduled timeout, or `None` when nothing is in flight.
    ///
    /// May name a deadline whose datagram has already settled; waking for it
    /// is harmless.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.queue_timeout.peek().map(|entry| entry.deadline)
    }

    /// Number of datagrams with outstanding work: queued acks plus in-flight
    /// sends. Stale bookkeeping entries are not counted.
    pub fn queue_pending(&self) -> usize {
        self.queue_ack.len() + self.in_flight.len()
    }

    /// Number of datagrams awaiting an ack.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Drops timeout-heap entries whose sequence has already settled and
    /// returns how many were removed. Purely a memory-hygiene pass; stale
    /// entries are otherwise dropped lazily as they surface.
    pub fn purge_stale_timeouts(&mut self) -> usize {
        let mut entries = std::mem::take(&mut self.queue_timeout).into_vec();
        let before = entries.len();
        entries.retain(|entry| self.in_flight.contains_key(&entry.sequence));
        let purged = before - entries.len();
        self.queue_timeout = BinaryHeap::from(entries);
        purged
    }

    /// Clears the in-flight table and all queues without reporting terminal
    /// outcomes. The sequence counter is left alone.
    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.queue_ack.clear();
        self.queue_resend.clear();
        self.queue_timeout.clear();
    }

    fn fire_terminal(&mut self, outcome: TerminalOutcome, payload: Option<&[u8]>, addr: SocketAddr) {
        if let Some(callback) = self.on_terminal.as_mut() {
            callback(outcome, payload, addr);
        }
    }
}
