//! Request/reply client over UDP

use std::net::SocketAddr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::datagram::{decode, encode, MAX_DATAGRAM_SIZE};
use crate::error::{Error, Result};

/// Sends one datagram and waits for one reply
#[derive(Debug, Clone, Copy)]
pub struct DatagramClient {
    timeout: Duration,
}

impl DatagramClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send `request` to `addr` and decode the reply.
    ///
    /// Each call uses a fresh ephemeral socket connected to `addr`, so only
    /// datagrams from that peer are accepted as the reply.
    pub async fn call<Req, Resp>(&self, addr: SocketAddr, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = encode(request)?;
        let local: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        socket.send(&payload).await?;
        debug!(to = %addr, len = payload.len(), "Request sent");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;
        decode(&buf[..len])
    }

    /// Resolve `host:port` and call the first address it yields
    pub async fn call_host<Req, Resp>(&self, target: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let addr = resolve(target).await?;
        self.call(addr, request).await
    }
}

/// Resolve a `host:port` string to a socket address
pub async fn resolve(target: &str) -> Result<SocketAddr> {
    lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| Error::PeerUnreachable(format!("No address for {}", target)))
}
