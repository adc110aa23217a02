//! Registry state: published endpoints and the allocated port pool

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::ops::Range;

use rand::Rng;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use campus_core::{Campus, ServiceKind};

use crate::protocol::RegistryEntry;

/// Endpoint directory keyed by (service kind, campus)
pub struct Directory {
    entries: RwLock<HashMap<(ServiceKind, Campus), RegistryEntry>>,
    /// Registered and handed-out ports, never offered again
    pool: Mutex<HashSet<u16>>,
    range: Range<u16>,
}

impl Directory {
    pub fn new(range: Range<u16>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            pool: Mutex::new(HashSet::new()),
            range,
        }
    }

    /// Publish an entry. Returns false if the key is already taken.
    pub async fn register(&self, entry: RegistryEntry) -> bool {
        let key = (entry.service_kind, entry.campus);
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            debug!(kind = %entry.service_kind, campus = %entry.campus, "Already registered");
            return false;
        }
        self.pool.lock().await.insert(entry.port);
        info!(
            kind = %entry.service_kind,
            campus = %entry.campus,
            addr = %entry.address(),
            "Registered endpoint"
        );
        entries.insert(key, entry);
        true
    }

    pub async fn lookup(&self, service_kind: ServiceKind, campus: Campus) -> Option<RegistryEntry> {
        self.entries.read().await.get(&(service_kind, campus)).cloned()
    }

    /// Pick a random port that is free locally and not yet handed out.
    ///
    /// Keeps drawing until one is found, so an exhausted range never returns.
    pub async fn available_port(&self) -> u16 {
        loop {
            let candidate = rand::thread_rng().gen_range(self.range.clone());
            if self.pool.lock().await.contains(&candidate) {
                continue;
            }
            if !port_is_free(candidate).await {
                debug!(port = candidate, "Port in use locally");
                continue;
            }
            if self.pool.lock().await.insert(candidate) {
                return candidate;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// True if both a TCP listener and a UDP socket can bind `port`
async fn port_is_free(port: u16) -> bool {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let tcp = TcpListener::bind(addr).await;
    let udp = UdpSocket::bind(addr).await;
    tcp.is_ok() && udp.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(kind: ServiceKind, campus: Campus, port: u16) -> RegistryEntry {
        RegistryEntry {
            service_kind: kind,
            campus,
            host: "127.0.0.1".to_string(),
            port,
            path: "server".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = Directory::new(1025..65000);
        assert!(directory.is_empty().await);
        assert!(directory.register(entry(ServiceKind::InterNode, Campus::Dvl, 5000)).await);

        let found = directory.lookup(ServiceKind::InterNode, Campus::Dvl).await.unwrap();
        assert_eq!(found.port, 5000);
        assert!(directory.lookup(ServiceKind::Directory, Campus::Dvl).await.is_none());
        assert!(directory.lookup(ServiceKind::InterNode, Campus::Kkl).await.is_none());
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let directory = Directory::new(1025..65000);
        assert!(directory.register(entry(ServiceKind::InterNode, Campus::Wst, 5000)).await);
        assert!(!directory.register(entry(ServiceKind::InterNode, Campus::Wst, 6000)).await);

        let found = directory.lookup(ServiceKind::InterNode, Campus::Wst).await.unwrap();
        assert_eq!(found.port, 5000);
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registers_do_not_interfere() {
        let directory = Arc::new(Directory::new(1025..65000));
        let mut entries = Vec::new();
        for (i, kind) in [ServiceKind::InterNode, ServiceKind::Directory].into_iter().enumerate() {
            for (j, campus) in Campus::ALL.into_iter().enumerate() {
                entries.push(entry(kind, campus, 5000 + (i * 10 + j) as u16));
            }
        }
        // Competing registrations for one key
        for port in 6000..6004 {
            entries.push(entry(ServiceKind::InterNode, Campus::Dvl, port));
        }

        let tasks: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let directory = directory.clone();
                tokio::spawn(async move {
                    let won = directory.register(entry.clone()).await;
                    (entry, won)
                })
            })
            .collect();

        let mut winners = HashMap::new();
        for task in tasks {
            let (entry, won) = task.await.unwrap();
            if won {
                let key = (entry.service_kind, entry.campus);
                assert!(winners.insert(key, entry.port).is_none(), "{:?} won twice", key);
            }
        }
        assert_eq!(winners.len(), 6);
        assert_eq!(directory.len().await, 6);
        for ((kind, campus), port) in winners {
            let found = directory.lookup(kind, campus).await.unwrap();
            assert_eq!((found.service_kind, found.campus, found.port), (kind, campus, port));
        }
    }

    #[tokio::test]
    async fn test_available_port_never_repeats() {
        let directory = Directory::new(40000..40010);
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let port = directory.available_port().await;
            assert!((40000..40010).contains(&port));
            assert!(seen.insert(port), "port {} handed out twice", port);
        }
    }

    #[tokio::test]
    async fn test_available_port_skips_registered() {
        let directory = Directory::new(41000..41002);
        directory.register(entry(ServiceKind::Directory, Campus::Kkl, 41000)).await;
        assert_eq!(directory.available_port().await, 41001);
    }

    #[tokio::test]
    async fn test_available_port_skips_bound() {
        let held = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = held.local_addr().unwrap().port();
        assert!(!port_is_free(port).await);
    }
}
