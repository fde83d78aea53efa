//! UDP transport implementation
//!
//! Each call is one datagram holding one RPC frame. Peers are addressed
//! through an address book; senders are identified on receipt by reverse
//! lookup of the source address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crisscross_core::{CoordError, CoordResult, PeerId, Rpc};
use crisscross_wire::{decode_rpc, encode_rpc, MAX_FRAME_SIZE};

use crate::{Inbound, Transport, TransportResult};

/// Peer name to socket address
#[derive(Clone, Debug, Default)]
pub struct AddressBook {
    entries: Arc<RwLock<HashMap<PeerId, SocketAddr>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: PeerId, addr: SocketAddr) {
        self.entries.write().insert(peer, addr);
    }

    pub fn remove(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.entries.write().remove(peer)
    }

    pub fn lookup(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.entries.read().get(peer).copied()
    }

    /// Reverse lookup
    pub fn peer_at(&self, addr: SocketAddr) -> Option<PeerId> {
        self.entries
            .read()
            .iter()
            .find(|(_, a)| **a == addr)
            .map(|(p, _)| p.clone())
    }
}

/// UDP transport for CrissCross
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    local: PeerId,
    book: AddressBook,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(local: PeerId, addr: SocketAddr, book: AddressBook) -> CoordResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| CoordError::Transport(e.to_string()))?;

        Ok(UdpTransport {
            socket: Arc::new(socket),
            local_addr,
            local,
            book,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    /// Send raw bytes to a destination
    pub async fn send_bytes_to(&self, bytes: &[u8], dest: SocketAddr) -> CoordResult<()> {
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Receive one call (blocking)
    pub async fn recv_from(&self) -> CoordResult<(Rpc, SocketAddr)> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?;

        let rpc = decode_rpc(Bytes::copy_from_slice(&buf[..len]))?;
        Ok((rpc, addr))
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    async fn call(&self, peer: &PeerId, rpc: Rpc) -> TransportResult<()> {
        let dest = self
            .book
            .lookup(peer)
            .ok_or_else(|| CoordError::PeerUnreachable(peer.clone()))?;
        let frame = encode_rpc(&rpc)?;
        self.send_bytes_to(&frame, dest).await
    }
}

/// Start a background receive loop
///
/// Frames that fail to decode, or arrive from addresses missing from the
/// address book, are logged and dropped.
pub fn start_receive_loop(
    socket: Arc<UdpSocket>,
    book: AddressBook,
    buffer_size: usize,
) -> mpsc::Receiver<Inbound> {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let Some(from) = book.peer_at(addr) else {
                        tracing::warn!(%addr, "Datagram from unknown address dropped");
                        continue;
                    };
                    let rpc = match decode_rpc(Bytes::copy_from_slice(&buf[..len])) {
                        Ok(rpc) => rpc,
                        Err(e) => {
                            tracing::warn!(%from, "Malformed frame dropped: {}", e);
                            continue;
                        }
                    };
                    if tx.send(Inbound { from, rpc }).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisscross_core::{ActorId, SessionId};

    async fn bind(name: &str, book: &AddressBook) -> UdpTransport {
        let transport = UdpTransport::bind(PeerId::new(name), "127.0.0.1:0".parse().unwrap(), book.clone())
            .await
            .unwrap();
        book.insert(PeerId::new(name), transport.local_addr());
        transport
    }

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let book = AddressBook::new();
        let transport = bind("alice", &book).await;

        assert_ne!(transport.local_addr().port(), 0);
        assert_eq!(book.peer_at(transport.local_addr()), Some(PeerId::new("alice")));
    }

    #[tokio::test]
    async fn test_udp_call_roundtrip() {
        let book = AddressBook::new();
        let alice = bind("alice", &book).await;
        let coordinator = bind("coordinator", &book).await;
        let mut inbound = start_receive_loop(coordinator.socket(), book.clone(), 16);

        let ping = Rpc::Heartbeat {
            session: SessionId(7),
            actor: ActorId::new("alice"),
        };
        alice.call(&PeerId::new("coordinator"), ping.clone()).await.unwrap();

        let received = inbound.recv().await.unwrap();
        assert_eq!(received.from, PeerId::new("alice"));
        assert_eq!(received.rpc, ping);
    }

    #[tokio::test]
    async fn test_missing_address_unreachable() {
        let book = AddressBook::new();
        let alice = bind("alice", &book).await;

        let err = alice
            .call(
                &PeerId::new("nobody"),
                Rpc::Heartbeat {
                    session: SessionId(1),
                    actor: ActorId::new("alice"),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, CoordError::PeerUnreachable(PeerId::new("nobody")));
    }
}
