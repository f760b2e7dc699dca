// src/socket.rs
//! Header-framing adapter over a UDP socket.

use crate::protocol::{FrameHeader, HEADER_SIZE};
use bytes::{Bytes, BytesMut};
use log::{trace, warn};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Largest UDP payload the adapter will accept in one read.
const RECV_BUFFER_SIZE: usize = 65_536;

/// A UDP socket that speaks the framed wire format: every outbound payload
/// gets the 5-byte header prepended, every inbound datagram has it parsed
/// off.
#[derive(Debug)]
pub struct FrameSocket {
    inner: UdpSocket,
    recv_buf: Vec<u8>,
}

impl FrameSocket {
    /// Binds a UDP socket to `addr`.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let inner = UdpSocket::bind(addr)?;
        Ok(Self {
            inner,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// The underlying socket, for mode changes (non-blocking, timeouts) and
    /// raw handle access.
    pub fn inner(&self) -> &UdpSocket {
        &self.inner
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Writes one frame. Returns the number of payload bytes sent.
    pub fn send_frame(
        &self,
        header: &FrameHeader,
        payload: &[u8],
        dst: SocketAddr,
    ) -> io::Result<usize> {
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        header.encode(&mut frame);
        frame.extend_from_slice(payload);

        let sent = self.inner.send_to(&frame, dst)?;
        if sent != frame.len() {
            // UDP writes are all-or-nothing; anything else means the frame
            // did not reach the wire intact.
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {} of {} bytes", sent, frame.len()),
            ));
        }
        trace!(
            "sent {:?} seq {} ({} payload bytes) to {}",
            header.kind,
            header.sequence,
            payload.len(),
            dst
        );
        Ok(payload.len())
    }

    /// Reads one frame, copying its payload into `buf`.
    ///
    /// Returns `Ok(None)` for frames that fail header validation (too short,
    /// unknown type); the caller is expected to read again. Reads failing
    /// with `ConnectionReset` are retried in place: on connectionless
    /// sockets that error only reports a prior ICMP port-unreachable, not a
    /// problem with the next datagram.
    pub fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<Option<(FrameHeader, usize, SocketAddr)>> {
        let (received, src) = loop {
            match self.inner.recv_from(&mut self.recv_buf) {
                Ok(result) => break result,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    trace!("ignoring connection-reset report on datagram socket");
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        let mut frame = Bytes::copy_from_slice(&self.recv_buf[..received]);
        let Some(header) = FrameHeader::decode(&mut frame) else {
            warn!("dropping malformed {}-byte frame from {}", received, src);
            return Ok(None);
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        trace!(
            "received {:?} seq {} ({} payload bytes) from {}",
            header.kind,
            header.sequence,
            len,
            src
        );
        Ok(Some((header, len, src)))
    }
}
