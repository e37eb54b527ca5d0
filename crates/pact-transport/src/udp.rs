//! UDP datagram transport.
//!
//! One socket per participant, one frame per datagram. UDP is naturally
//! fair-lossy on real networks, which is exactly the contract the flooding
//! driver needs; nothing here retries or acknowledges anything.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use log::debug;
use tokio::net::UdpSocket;

use crate::contract::{Transport, TransportError};

/// Largest datagram accepted off the socket.
const RECV_BUFFER_BYTES: usize = 65536;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Bind a local address and fix the peer this endpoint talks to.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, peer })
    }

    /// Wrap an already-bound socket.
    pub fn from_socket(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.socket
            .send_to(&frame, self.peer)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Closed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER_BYTES];
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| TransportError::Closed(e.to_string()))?;
            if from != self.peer {
                debug!("dropped datagram from unexpected source {}", from);
                continue;
            }
            return Ok(buf[..len].to_vec());
        }
    }
}
