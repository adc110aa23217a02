//! Registry server
//!
//! Listens on a well-known UDP port. Nodes publish their endpoints here and
//! resolve each other's by (service kind, campus).

use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::datagram::{self, decode, encode, DatagramHandler};
use crate::directory::Directory;
use crate::error::Result;
use crate::protocol::{Action, ErrorKind, RegistryAction, RegistryRequest, Response};

/// Registry server handle
pub struct RegistryServer {
    addr: SocketAddr,
    directory: Arc<Directory>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RegistryServer {
    /// Bind `addr` and start serving
    pub async fn start(addr: SocketAddr, port_range: Range<u16>) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let bound_addr = socket.local_addr()?;
        info!(addr = %bound_addr, "Registry started");

        let directory = Arc::new(Directory::new(port_range));
        let (shutdown_tx, _) = broadcast::channel(1);
        let handler = Arc::new(RegistryHandler {
            directory: directory.clone(),
        });
        tokio::spawn(datagram::serve(socket, handler, shutdown_tx.subscribe()));

        Ok(Self {
            addr: bound_addr,
            directory,
            shutdown_tx,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Registry shutdown initiated");
    }
}

struct RegistryHandler {
    directory: Arc<Directory>,
}

#[async_trait]
impl DatagramHandler for RegistryHandler {
    async fn handle(&self, payload: Vec<u8>, from: SocketAddr) -> Option<Vec<u8>> {
        let response = match decode::<RegistryRequest>(&payload) {
            Ok(request) => handle_request(&self.directory, request).await,
            Err(e) => {
                warn!(from = %from, error = %e, "Undecodable registry request");
                Response::fail(Action::Unrecognized, ErrorKind::Malformed, e.to_string(), "None")
            }
        };
        info!(
            target: "audit",
            action = ?response.action,
            success = response.success,
            parameters = %response.parameters,
            message = %response.message,
            "Registry request"
        );
        match encode(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(from = %from, error = %e, "Failed to encode registry reply");
                None
            }
        }
    }
}

async fn handle_request(directory: &Directory, request: RegistryRequest) -> Response {
    let action = Action::from(request.action);
    let parameters = request.parameters();
    match request.action {
        RegistryAction::Register => {
            let Some(entry) = request.entry() else {
                return Response::fail(
                    action,
                    ErrorKind::InvalidArgument,
                    "Registration requires type, campus, host and port",
                    parameters,
                );
            };
            let message = format!("{} {} at {}", entry.campus, entry.service_kind, entry.address());
            if directory.register(entry).await {
                Response::ok(action, format!("Registered {}", message), parameters)
            } else {
                Response::fail(
                    action,
                    ErrorKind::AlreadyExists,
                    format!("Unable to register {}", message),
                    parameters,
                )
            }
        }
        RegistryAction::Lookup => {
            let (Some(kind), Some(campus)) = (request.service_kind, request.campus) else {
                return Response::fail(
                    action,
                    ErrorKind::InvalidArgument,
                    "Lookup requires type and campus",
                    parameters,
                );
            };
            match directory.lookup(kind, campus).await {
                Some(entry) => Response::ok(action, entry.address(), parameters).with_entry(entry),
                None => Response::fail(
                    action,
                    ErrorKind::NotFound,
                    format!("No {} endpoint for {}", kind, campus),
                    parameters,
                ),
            }
        }
        RegistryAction::GetAvailablePort => {
            let port = directory.available_port().await;
            Response::ok(action, port.to_string(), parameters).with_port(port)
        }
    }
}
