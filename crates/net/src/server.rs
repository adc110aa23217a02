//! UDP server for a campus node
//!
//! A node listens on two sockets: the client-facing endpoint and the
//! inter-node endpoint. Each inbound datagram is handled in its own task.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::datagram::{self, decode, encode, DatagramHandler};
use crate::error::Result;
use crate::node::{CampusNode, Channel};
use crate::protocol::{Action, ErrorKind, Request, Response};

/// Campus server handle
pub struct CampusServer {
    client_addr: SocketAddr,
    inter_node_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl CampusServer {
    /// Bind both endpoints and start serving
    pub async fn start(
        node: Arc<CampusNode>,
        client_addr: SocketAddr,
        inter_node_addr: SocketAddr,
    ) -> Result<Self> {
        let client_socket = Arc::new(UdpSocket::bind(client_addr).await?);
        let inter_node_socket = Arc::new(UdpSocket::bind(inter_node_addr).await?);
        let client_addr = client_socket.local_addr()?;
        let inter_node_addr = inter_node_socket.local_addr()?;

        info!(
            campus = %node.campus(),
            client = %client_addr,
            inter_node = %inter_node_addr,
            "Campus server started"
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        for (socket, channel) in [
            (client_socket, Channel::Client),
            (inter_node_socket, Channel::InterNode),
        ] {
            let handler = Arc::new(ChannelHandler {
                node: node.clone(),
                channel,
            });
            tokio::spawn(datagram::serve(socket, handler, shutdown_tx.subscribe()));
        }

        Ok(Self {
            client_addr,
            inter_node_addr,
            shutdown_tx,
        })
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn inter_node_addr(&self) -> SocketAddr {
        self.inter_node_addr
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Campus server shutdown initiated");
    }
}

struct ChannelHandler {
    node: Arc<CampusNode>,
    channel: Channel,
}

#[async_trait]
impl DatagramHandler for ChannelHandler {
    async fn handle(&self, payload: Vec<u8>, from: SocketAddr) -> Option<Vec<u8>> {
        let response = match decode::<Request>(&payload) {
            Ok(request) => self.node.handle(self.channel, request).await,
            Err(e) => {
                warn!(from = %from, error = %e, "Undecodable request");
                Response::fail(Action::Unrecognized, ErrorKind::Malformed, e.to_string(), "None")
            }
        };
        audit(self.node.campus(), self.channel, &response);

        match encode(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(from = %from, error = %e, "Reply does not fit a datagram");
                let fallback = Response::fail(
                    response.action,
                    ErrorKind::Malformed,
                    "Reply too large",
                    "None",
                );
                encode(&fallback).ok()
            }
        }
    }
}

/// One audit line per completed operation
fn audit(campus: campus_core::Campus, channel: Channel, response: &Response) {
    info!(
        target: "audit",
        %campus,
        ?channel,
        timestamp = %response.timestamp,
        action = ?response.action,
        success = response.success,
        parameters = %response.parameters,
        message = %response.message
    );
}
