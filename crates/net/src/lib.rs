//! Campus Network Library
//!
//! Provides UDP-based networking for the campus reservation system.
//!
//! # Architecture
//!
//! - **Registry**: well-known directory mapping (service kind, campus) to endpoints
//! - **Campus server**: client-facing and inter-node endpoints of one campus
//! - **Aggregator**: concurrent fan-out to peer campuses with per-call timeouts
//! - **Protocol**: one JSON datagram per request and per reply
//!
//! # Usage
//!
//! ```ignore
//! // Registry
//! let registry = RegistryServer::start("0.0.0.0:1024".parse()?, 1025..65000).await?;
//!
//! // Campus node
//! let client = RegistryClient::new("127.0.0.1:1024", timeout);
//! let port = client.ensure_registered(ServiceKind::InterNode, Campus::Dvl, "127.0.0.1", "server").await?;
//! let node = Arc::new(CampusNode::new(store, Arc::new(RegistryPeerLink::new(client)), timeout, 3));
//! let server = CampusServer::start(node, client_addr, inter_node_addr).await?;
//! ```

pub mod aggregator;
pub mod client;
pub mod datagram;
pub mod directory;
pub mod error;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod registry_client;
pub mod server;

pub use aggregator::{Aggregator, Tally};
pub use client::DatagramClient;
pub use directory::Directory;
pub use error::{Error, Result};
pub use node::{CampusNode, Channel};
pub use peer::{PeerLink, RegistryPeerLink};
pub use protocol::{Action, ErrorKind, RegistryEntry, RegistryRequest, Request, Response};
pub use registry::RegistryServer;
pub use registry_client::RegistryClient;
pub use server::CampusServer;
