// src/multi.rs
//! Multi-recipient sending on top of the reliable endpoint.

use crate::endpoint::ReliableEndpoint;
use crate::error::Result;
use crate::peer::PeerContainer;
use crate::timeout::TimeoutPolicy;
use log::debug;
use std::net::SocketAddr;

/// Fan-out sending: the same payload delivered reliably to a set of peers.
///
/// Each recipient gets an independent registration (and sequence number);
/// there is no sharing of the payload buffer between them.
pub trait SendMulti {
    fn send_to(&mut self, payload: &[u8], dst: SocketAddr) -> Result<usize>;

    /// Sends `payload` to every address in `addrs`. Returns how many sends
    /// were accepted.
    fn send_multi<I>(&mut self, payload: &[u8], addrs: I) -> usize
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        self.send_multi_with(payload, addrs, |addr| addr)
    }

    /// Sends `payload` to the address projected from each item of `items`.
    /// Returns how many sends were accepted.
    fn send_multi_with<I, F>(&mut self, payload: &[u8], items: I, project: F) -> usize
    where
        I: IntoIterator,
        F: Fn(I::Item) -> SocketAddr,
    {
        let mut accepted = 0;
        for item in items {
            let dst = project(item);
            match self.send_to(payload, dst) {
                Ok(_) => accepted += 1,
                Err(error) => debug!("multi-send to {} not accepted: {}", dst, error),
            }
        }
        accepted
    }
}

impl<T, P> SendMulti for ReliableEndpoint<T, P>
where
    T: TimeoutPolicy,
    P: PeerContainer<T::PeerState>,
{
    fn send_to(&mut self, payload: &[u8], dst: SocketAddr) -> Result<usize> {
        ReliableEndpoint::send_to(self, payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdaptiveEndpoint;
    use crate::protocol::HEADER_SIZE;
    use std::net::UdpSocket;
    use std::time::Duration;

    #[test]
    fn multi_send_reaches_every_recipient() {
        let mut sender = AdaptiveEndpoint::bind("127.0.0.1:0").unwrap();

        let receivers: Vec<UdpSocket> = (0..2)
            .map(|_| {
                let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
                socket
                    .set_read_timeout(Some(Duration::from_secs(1)))
                    .unwrap();
                socket
            })
            .collect();
        let addrs: Vec<_> = receivers
            .iter()
            .map(|socket| socket.local_addr().unwrap())
            .collect();

        assert_eq!(sender.send_multi(b"ping", addrs.clone()), 2);

        // Every peer got its own framed copy.
        let mut buf = [0u8; 64];
        for receiver in &receivers {
            let (received, _) = receiver.recv_from(&mut buf).unwrap();
            assert_eq!(received, HEADER_SIZE + 4);
        }
    }

    #[test]
    fn multi_send_with_projection() {
        let mut sender = AdaptiveEndpoint::bind("127.0.0.1:0").unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();

        let peers = [("peer-a", receiver.local_addr().unwrap())];
        assert_eq!(
            sender.send_multi_with(b"ping", peers, |(_name, addr)| addr),
            1
        );
    }
}
