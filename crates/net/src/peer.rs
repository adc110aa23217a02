//! Links to other campus nodes

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use campus_core::{Campus, ServiceKind};

use crate::client::{resolve, DatagramClient};
use crate::error::{Error, Result};
use crate::protocol::{Request, Response};
use crate::registry_client::RegistryClient;

/// Sends a request to another campus over its inter-node endpoint.
/// `timeout` bounds the wait for the reply once the peer is resolved.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn send(&self, campus: Campus, request: &Request, timeout: Duration) -> Result<Response>;
}

/// Resolves peers through the registry.
///
/// Only successful resolutions are cached. An address is dropped from the
/// cache when a call to it fails, so a node that re-registers is found again.
pub struct RegistryPeerLink {
    registry: RegistryClient,
    cache: RwLock<HashMap<Campus, SocketAddr>>,
}

impl RegistryPeerLink {
    pub fn new(registry: RegistryClient) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn resolve(&self, campus: Campus) -> Result<SocketAddr> {
        if let Some(addr) = self.cache.read().await.get(&campus) {
            return Ok(*addr);
        }
        let entry = self
            .registry
            .lookup(ServiceKind::InterNode, campus)
            .await?
            .ok_or_else(|| Error::PeerUnreachable(format!("{} is not registered", campus)))?;
        let addr = resolve(&entry.address()).await?;
        debug!(%campus, %addr, "Resolved peer");
        self.cache.write().await.insert(campus, addr);
        Ok(addr)
    }

    pub async fn cached(&self, campus: Campus) -> Option<SocketAddr> {
        self.cache.read().await.get(&campus).copied()
    }
}

#[async_trait]
impl PeerLink for RegistryPeerLink {
    async fn send(&self, campus: Campus, request: &Request, timeout: Duration) -> Result<Response> {
        let addr = self.resolve(campus).await?;
        let result = DatagramClient::new(timeout).call(addr, request).await;
        if result.is_err() {
            self.cache.write().await.remove(&campus);
        }
        result
    }
}
