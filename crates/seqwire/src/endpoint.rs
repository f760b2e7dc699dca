// src/endpoint.rs
//! Socket-like façade over the reliability engine.

use crate::error::Result;
use crate::protocol::{DgramInfo, DgramKind, FrameHeader};
use crate::reliability::{AckResendEngine, QueuedFrame, TerminalOutcome};
use crate::peer::PeerContainer;
use crate::socket::FrameSocket;
use crate::timeout::TimeoutPolicy;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

/// Reliable datagram endpoint: a UDP socket plus the reliability engine.
///
/// Single-threaded and caller-driven. Every `send_to`/`flush`/`recv_from`
/// call first services whatever the engine has queued (acks owed to peers,
/// resends whose deadline lapsed); timers are passive, so an application
/// that wants timely retransmits should wake at [`next_wakeup`] and call
/// [`flush`].
///
/// [`next_wakeup`]: ReliableEndpoint::next_wakeup
/// [`flush`]: ReliableEndpoint::flush
pub struct ReliableEndpoint<T, P>
where
    T: TimeoutPolicy,
    P: PeerContainer<T::PeerState>,
{
    socket: FrameSocket,
    engine: AckResendEngine<T, P>,
}

impl<T, P> ReliableEndpoint<T, P>
where
    T: TimeoutPolicy,
    P: PeerContainer<T::PeerState>,
{
    /// Binds a UDP socket to `addr` with a fresh engine.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self>
    where
        T: Default,
    {
        Ok(Self {
            socket: FrameSocket::bind(addr)?,
            engine: AckResendEngine::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The underlying UDP socket, for mode changes (non-blocking, read
    /// timeouts) and raw handle access.
    pub fn socket(&self) -> &UdpSocket {
        self.socket.inner()
    }

    /// Sets the callback receiving each datagram's terminal outcome.
    pub fn set_terminal_callback<F>(&mut self, callback: F)
    where
        F: FnMut(TerminalOutcome, Option<&[u8]>, SocketAddr) + Send + 'static,
    {
        self.engine.set_terminal_callback(callback);
    }

    /// True when the engine holds work that a [`flush`](Self::flush) (or any
    /// send) would transmit.
    pub fn needs_to_send(&mut self) -> bool {
        self.engine.has_pending_send(Instant::now())
    }

    /// When the earliest retransmission is due, or `None` with nothing in
    /// flight.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.engine.next_wakeup()
    }

    /// Sends `payload` reliably to `dst`.
    ///
    /// Queued acks and due resends are transmitted first, then the payload
    /// is registered and sent. Returns the payload bytes accepted for the
    /// wire; back-pressure is absorbed (the datagram is deferred and the
    /// call still succeeds). A returned error means the datagram's FAILURE
    /// outcome has already been reported.
    pub fn send_to(&mut self, payload: &[u8], dst: SocketAddr) -> Result<usize> {
        if let Err(error) = self.drain_queues() {
            // The caller's datagram must still get a terminal disposition
            // instead of being silently dropped.
            let info = self.engine.register_new(dst);
            return match self
                .engine
                .on_send_failure(payload, dst, &info, &error, Instant::now())
            {
                Some(accepted) => Ok(accepted),
                None => Err(error.into()),
            };
        }

        let info = self.engine.register_new(dst);
        let header = FrameHeader::new(info.kind, info.sequence);
        let now = Instant::now();
        match self.socket.send_frame(&header, payload, dst) {
            Ok(_) => self.engine.on_send_success(payload, dst, &info, now),
            Err(error) => match self.engine.on_send_failure(payload, dst, &info, &error, now) {
                Some(accepted) => Ok(accepted),
                None => Err(error.into()),
            },
        }
    }

    /// Transmits queued acks and due resends without sending new data.
    pub fn flush(&mut self) -> Result<()> {
        self.drain_queues().map_err(Into::into)
    }

    fn drain_queues(&mut self) -> io::Result<()> {
        loop {
            let now = Instant::now();
            let Some(frame) = self.engine.drain_ready(now) else {
                return Ok(());
            };
            self.transmit(&frame, now)?;
        }
    }

    fn transmit(&mut self, frame: &QueuedFrame, now: Instant) -> io::Result<()> {
        let header = FrameHeader::new(frame.info.kind, frame.info.sequence);
        match self.socket.send_frame(&header, &frame.payload, frame.addr) {
            Ok(_) => {
                self.engine
                    .on_send_success(&frame.payload, frame.addr, &frame.info, now)
                    .map_err(io::Error::other)?;
                Ok(())
            }
            Err(error) => {
                self.engine
                    .on_send_failure(&frame.payload, frame.addr, &frame.info, &error, now);
                Err(error)
            }
        }
    }

    /// Receives the next USER payload into `buf`.
    ///
    /// Control frames (acks) and malformed frames are consumed internally
    /// and the read repeats; socket errors — including a lapsed read
    /// timeout — are returned immediately.
    pub fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            let Some((header, len, src)) = self.socket.recv_frame(buf)? else {
                continue;
            };
            let info = DgramInfo::new(header.kind, header.sequence);
            let accepted = self
                .engine
                .on_received(&buf[..len], src, &info, Instant::now());
            if header.kind == DgramKind::User {
                return Ok((accepted, src));
            }
        }
    }

    /// Discards all engine state (no terminal callbacks fire) and drops the
    /// socket.
    pub fn close(mut self) {
        self.engine.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdaptiveEndpoint, config};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Outcomes = Arc<Mutex<Vec<(TerminalOutcome, SocketAddr)>>>;

    fn bind_local() -> AdaptiveEndpoint {
        let endpoint = AdaptiveEndpoint::bind("127.0.0.1:0").unwrap();
        endpoint
            .socket()
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        endpoint
    }

    fn capture_outcomes(endpoint: &mut AdaptiveEndpoint) -> Outcomes {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        endpoint.set_terminal_callback(move |outcome, _payload, addr| {
            sink.lock().unwrap().push((outcome, addr));
        });
        outcomes
    }

    fn is_timeout(kind: io::ErrorKind) -> bool {
        matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    }

    #[test]
    fn echo_round_trip_settles_both_sides() {
        let _guard = config::test_support::lock();
        config::set_send_try_count(3);

        let mut client = bind_local();
        let mut server = bind_local();
        let client_outcomes = capture_outcomes(&mut client);
        let server_outcomes = capture_outcomes(&mut server);
        let server_addr = server.local_addr().unwrap();

        assert_eq!(client.send_to(b"1234", server_addr).unwrap(), 4);

        // Server sees the payload and now owes an ack.
        let mut buf = [0u8; 1500];
        let (received, client_addr) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..received], b"1234");
        assert!(server.needs_to_send());

        // Echoing drains the queued ack first, then sends the echo.
        assert_eq!(server.send_to(&buf[..received], client_addr).unwrap(), 4);
        assert!(!server.needs_to_send());

        // The client consumes the ack in passing and returns the echo.
        let (echoed, from) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..echoed], b"1234");
        assert_eq!(from, server_addr);
        assert_eq!(
            client_outcomes.lock().unwrap().as_slice(),
            &[(TerminalOutcome::Success, server_addr)]
        );

        // The client owes an ack for the echo; flushing it settles the
        // server's datagram too.
        assert!(client.needs_to_send());
        client.flush().unwrap();
        assert!(!client.needs_to_send());

        let err = server.recv_from(&mut buf).unwrap_err();
        match err {
            crate::TransportError::Io(e) => assert!(is_timeout(e.kind())),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            server_outcomes.lock().unwrap().as_slice(),
            &[(TerminalOutcome::Success, client_addr)]
        );
    }

    #[test]
    fn flush_without_pending_work_is_a_no_op() {
        let mut endpoint = bind_local();
        endpoint.flush().unwrap();
        assert!(!endpoint.needs_to_send());
    }

    #[test]
    fn unacked_send_schedules_a_wakeup() {
        let mut client = bind_local();
        let sink = bind_local();

        client.send_to(b"1234", sink.local_addr().unwrap()).unwrap();
        let wakeup = client.next_wakeup().expect("retransmit must be scheduled");
        assert!(wakeup > Instant::now());
    }
}
