//! Client side of the registry protocol

use std::time::Duration;

use tracing::{info, warn};

use campus_core::{Campus, ServiceKind};

use crate::client::DatagramClient;
use crate::error::{Error, Result};
use crate::protocol::{ErrorKind, RegistryEntry, RegistryRequest, Response};

#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Registry `host:port`
    target: String,
    client: DatagramClient,
}

impl RegistryClient {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            client: DatagramClient::new(timeout),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn call(&self, request: &RegistryRequest) -> Result<Response> {
        self.client
            .call_host(&self.target, request)
            .await
            .map_err(|e| Error::Registry(format!("{} unreachable: {}", self.target, e)))
    }

    /// Publish an entry. Returns false if the key was already taken.
    pub async fn register(&self, entry: &RegistryEntry) -> Result<bool> {
        let response = self.call(&RegistryRequest::register(entry)).await?;
        Ok(response.success)
    }

    pub async fn lookup(&self, kind: ServiceKind, campus: Campus) -> Result<Option<RegistryEntry>> {
        let response = self.call(&RegistryRequest::lookup(kind, campus)).await?;
        match (response.success, response.entry) {
            (true, Some(entry)) => Ok(Some(entry)),
            (false, _) if response.error == Some(ErrorKind::NotFound) => Ok(None),
            (_, _) => Err(Error::Registry(response.message)),
        }
    }

    pub async fn available_port(&self) -> Result<u16> {
        let response = self.call(&RegistryRequest::available_port()).await?;
        response
            .port
            .ok_or_else(|| Error::Registry(format!("No port in reply: {}", response.message)))
    }

    /// Find the port this endpoint should bind.
    ///
    /// An existing entry for (kind, campus) is reused, so a restarted node
    /// comes back on the same port. Otherwise a fresh port is allocated and
    /// registered.
    pub async fn ensure_registered(
        &self,
        kind: ServiceKind,
        campus: Campus,
        host: &str,
        path: &str,
    ) -> Result<u16> {
        if let Some(existing) = self.lookup(kind, campus).await? {
            info!(%kind, %campus, port = existing.port, "Reusing registered port");
            return Ok(existing.port);
        }

        let port = self.available_port().await?;
        let entry = RegistryEntry {
            service_kind: kind,
            campus,
            host: host.to_string(),
            port,
            path: path.to_string(),
        };
        if !self.register(&entry).await? {
            warn!(%kind, %campus, port, "Registration rejected");
            return Err(Error::Registry(format!(
                "Unable to register {} {} at {}",
                campus,
                kind,
                entry.address()
            )));
        }
        info!(%kind, %campus, port, "Registered");
        Ok(port)
    }
}
