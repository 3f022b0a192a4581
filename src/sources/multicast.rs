//! Blocks received as multicast datagrams

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::source::{BlockSource, RawBlock};
use crate::transport::DatagramBlocks;
use crate::{Result, StreamError};

/// Largest datagram accepted.
const MAX_DATAGRAM_LEN: usize = 64 * 1024;

/// Bind `0.0.0.0:port` with address reuse, so several receivers can share a
/// multicast port. Must be called inside a tokio runtime.
pub fn bind_reusable(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let bind = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(bind))?;
    UdpSocket::from_std(socket.into())
}

/// Receives datagrams carrying whole blocks.
///
/// A datagram may pack several blocks; they are queued and handed out one at a
/// time. A trailing partial block is dropped with the datagram.
pub struct MulticastSource {
    socket: UdpSocket,
    endpoint: String,
    pending: VecDeque<RawBlock>,
    datagram: Vec<u8>,
}

impl MulticastSource {
    /// Bind `port` on all interfaces and join `multicast` through the
    /// interface at `local`.
    pub async fn join(multicast: Ipv4Addr, local: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = bind_reusable(port).map_err(|e| {
            StreamError::connection_failed_with_source(
                format!("{multicast}:{port}"),
                "bind failed",
                Box::new(e),
            )
        })?;
        socket.join_multicast_v4(multicast, local).map_err(|e| {
            StreamError::connection_failed_with_source(
                format!("{multicast}:{port}"),
                "multicast join failed",
                Box::new(e),
            )
        })?;

        info!(%multicast, %local, port, "Joined multicast group");
        Ok(Self::from_socket(socket, format!("{multicast}:{port}")))
    }

    /// Receive from an already bound socket.
    pub fn from_socket(socket: UdpSocket, endpoint: impl Into<String>) -> Self {
        Self {
            socket,
            endpoint: endpoint.into(),
            pending: VecDeque::new(),
            datagram: vec![0u8; MAX_DATAGRAM_LEN],
        }
    }
}

#[async_trait::async_trait]
impl BlockSource for MulticastSource {
    async fn next_block(&mut self) -> Result<Option<RawBlock>> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Ok(Some(block));
            }

            let received = self
                .socket
                .recv(&mut self.datagram)
                .await
                .map_err(|e| StreamError::io("receive datagram", e))?;
            trace!(bytes = received, "Datagram received");

            self.pending.extend(
                DatagramBlocks::new(&self.datagram[..received])
                    .map(|(header, body)| RawBlock::new(header.tag, body)),
            );
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
