//! Process bodies for the registry and campus node subcommands

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use campus_core::{Campus, NodeConfig, RegistryConfig, ReservationStore, ServiceKind};
use campus_net::{CampusNode, CampusServer, RegistryClient, RegistryPeerLink, RegistryServer};

use crate::error::{AppError, AppResult};

async fn socket_addr(host: &str, port: u16) -> AppResult<SocketAddr> {
    let target = format!("{}:{}", host, port);
    let addr = tokio::net::lookup_host(&target)
        .await
        .map_err(|_| AppError::Address(target.clone()))?
        .next();
    addr.ok_or(AppError::Address(target))
}

/// Bind the registry on its configured port
pub async fn start_registry(config: &RegistryConfig) -> AppResult<RegistryServer> {
    let addr = socket_addr(&config.bind_host, config.port).await?;
    let server = RegistryServer::start(addr, config.port_range_min..config.port_range_max).await?;
    Ok(server)
}

/// Register both endpoints of a campus and start serving them
pub async fn start_node(config: &NodeConfig) -> AppResult<CampusServer> {
    let campus: Campus = config.campus.ok_or(AppError::MissingCampus)?;
    let registry = RegistryClient::new(config.registry_addr(), config.peer_timeout());
    info!(%campus, registry = %registry.target(), "Registering endpoints");

    let inter_node_port = registry
        .ensure_registered(
            ServiceKind::InterNode,
            campus,
            &config.host,
            &config.inter_node_path,
        )
        .await?;
    let client_port = registry
        .ensure_registered(ServiceKind::Directory, campus, &config.host, &config.client_path)
        .await?;

    let store = Arc::new(ReservationStore::new(campus));
    let link = Arc::new(RegistryPeerLink::new(registry));
    let node = Arc::new(CampusNode::new(
        store,
        link,
        config.peer_timeout(),
        config.weekly_quota,
    ));

    let server = CampusServer::start(
        node,
        socket_addr(&config.host, client_port).await?,
        socket_addr(&config.host, inter_node_port).await?,
    )
    .await?;
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::Config;

    #[tokio::test]
    async fn test_node_without_campus() {
        let config = Config::default();
        let result = start_node(&config.node).await;
        assert!(matches!(result, Err(AppError::MissingCampus)));
    }

    #[tokio::test]
    async fn test_node_registers_with_registry() {
        let mut config = Config::default();
        config.registry.bind_host = "127.0.0.1".to_string();
        config.registry.port = 0;
        config.registry.port_range_min = 48000;
        config.registry.port_range_max = 49000;
        let registry = start_registry(&config.registry).await.unwrap();

        config.node.campus = Some(Campus::Wst);
        config.node.registry_port = registry.addr().port();
        let server = start_node(&config.node).await.unwrap();

        let entry = registry
            .directory()
            .lookup(ServiceKind::Directory, Campus::Wst)
            .await
            .unwrap();
        assert_eq!(entry.port, server.client_addr().port());
        assert_eq!(entry.path, "/roomreservation");

        server.shutdown();
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_node_fails_without_registry() {
        let mut config = Config::default();
        config.node.campus = Some(Campus::Dvl);
        config.node.registry_port = {
            let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket.local_addr().unwrap().port()
        };
        config.node.peer_timeout_ms = 200;
        let result = start_node(&config.node).await;
        assert!(matches!(result, Err(AppError::Net(_))));
    }
}
