//! Datagram encoding/decoding and the receive loop
//!
//! Wire format: one JSON document per UDP datagram. Receivers read into a
//! fixed buffer and ignore trailing NUL padding.
//! Maximum datagram size: 1000 bytes

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Receive buffer size and maximum encoded message size
pub const MAX_DATAGRAM_SIZE: usize = 1000;

/// Encode a message into a single datagram payload
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(msg)
        .map_err(|e| Error::Malformed(format!("Serialization failed: {}", e)))?;
    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(payload)
}

/// Decode a datagram payload
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T> {
    let payload = trim_padding(buf);
    if payload.is_empty() {
        return Err(Error::Malformed("Empty datagram".into()));
    }
    serde_json::from_slice(payload).map_err(|e| Error::Malformed(format!("Invalid JSON: {}", e)))
}

/// Strip trailing NUL bytes left by fixed-size sender buffers
pub fn trim_padding(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &buf[..end]
}

/// Produces the reply for one inbound datagram
#[async_trait]
pub trait DatagramHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Vec<u8>, from: SocketAddr) -> Option<Vec<u8>>;
}

/// Receive datagrams until shutdown, handling each in its own task
pub async fn serve(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn DatagramHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => {
                        debug!(from = %from, len, "Datagram received");
                        let payload = buf[..len].to_vec();
                        let socket = socket.clone();
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let Some(reply) = handler.handle(payload, from).await else {
                                return;
                            };
                            if let Err(e) = socket.send_to(&reply, from).await {
                                warn!(to = %from, error = %e, "Failed to send reply");
                            }
                        });
                    }
                    Err(e) => {
                        // ICMP errors from earlier sends surface here on some platforms
                        error!(error = %e, "Receive failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Receive loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RegistryAction, RegistryRequest};

    #[test]
    fn test_padding_is_ignored() {
        let mut buf = encode(&RegistryRequest::available_port()).unwrap();
        buf.resize(MAX_DATAGRAM_SIZE, 0);
        let decoded: RegistryRequest = decode(&buf).unwrap();
        assert_eq!(decoded.action, RegistryAction::GetAvailablePort);
    }

    #[test]
    fn test_empty_datagram_rejected() {
        let result: Result<RegistryRequest> = decode(&[0, 0, 0, 0]);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        let result: Result<RegistryRequest> = decode(b"not json");
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_oversized_message_rejected() {
        let big = "x".repeat(MAX_DATAGRAM_SIZE);
        let result = encode(&big);
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }

    struct Echo;

    #[async_trait]
    impl DatagramHandler for Echo {
        async fn handle(&self, payload: Vec<u8>, _from: SocketAddr) -> Option<Vec<u8>> {
            Some(payload)
        }
    }

    #[tokio::test]
    async fn test_serve_replies_and_stops() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(serve(socket, Arc::new(Echo), shutdown_rx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello", addr).await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
