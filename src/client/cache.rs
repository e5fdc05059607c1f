//! Process-wide cache of match function clients
//!
//! One client is kept per `(transport, host, port)`. Entries are never
//! evicted or refreshed; a cached client is trusted for the life of the
//! process.

use crate::client::rest::RestFunctionClient;
use crate::client::rpc::RpcFunctionClient;
use crate::client::trust::TrustMaterial;
use crate::client::MatchFunctionClient;
use crate::config::{FunctionClientSettings, TlsSettings};
use crate::error::FetchResult;
use crate::types::{ClientKey, FunctionEndpoint, TransportKind};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a client for a cache miss
pub trait ClientFactory: Send + Sync {
    fn create(&self, key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>>;
}

/// Factory for the real HTTP and AMQP transports
#[derive(Debug, Clone, Default)]
pub struct TransportClientFactory {
    tls: TlsSettings,
    settings: FunctionClientSettings,
}

impl TransportClientFactory {
    pub fn new(tls: TlsSettings, settings: FunctionClientSettings) -> Self {
        Self { tls, settings }
    }
}

impl ClientFactory for TransportClientFactory {
    fn create(&self, key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>> {
        let trust = TrustMaterial::load(&self.tls)?;
        let endpoint = FunctionEndpoint::new(key.host.clone(), key.port);

        let client: Arc<dyn MatchFunctionClient> = match key.kind {
            TransportKind::Rest => Arc::new(RestFunctionClient::new(
                &endpoint,
                trust.as_ref(),
                &self.settings,
            )?),
            TransportKind::Rpc => Arc::new(RpcFunctionClient::new(
                &endpoint,
                trust.as_ref(),
                &self.settings,
            )?),
        };
        Ok(client)
    }
}

/// Concurrent get-or-create store of match function clients
pub struct ClientCache {
    clients: DashMap<ClientKey, Arc<dyn MatchFunctionClient>>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: DashMap::new(),
            factory,
        }
    }

    /// Cache backed by the real transports
    pub fn with_transports(tls: TlsSettings, settings: FunctionClientSettings) -> Self {
        Self::new(Arc::new(TransportClientFactory::new(tls, settings)))
    }

    /// Return the client for `key`, constructing it on first use.
    ///
    /// Construction runs under the entry's shard lock, so concurrent first
    /// callers for the same key build one client and share it. A failed
    /// construction leaves no entry behind.
    pub fn get_client(&self, key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>> {
        if let Some(client) = self.clients.get(key) {
            debug!("Reusing cached match function client for {}", key);
            return Ok(client.value().clone());
        }

        let entry = self
            .clients
            .entry(key.clone())
            .or_try_insert_with(|| {
                info!("Creating match function client for {}", key);
                self.factory.create(key).inspect_err(|e| {
                    warn!("Failed to create match function client for {}: {}", key, e);
                })
            })?;

        Ok(entry.value().clone())
    }

    /// Number of cached clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.clients.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMatchFunctionClient;
    use crate::error::{FetchError, FAILED_TO_CONNECT};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory that counts constructions and hands out mock clients
    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn create(&self, key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            // Widen the race window for concurrent first access
            std::thread::sleep(std::time::Duration::from_millis(5));
            let mut client = MockMatchFunctionClient::new();
            let kind = key.kind;
            client.expect_kind().return_const(kind);
            Ok(Arc::new(client))
        }
    }

    fn key(kind: TransportKind) -> ClientKey {
        ClientKey {
            kind,
            host: "om-test".to_string(),
            port: 50321,
        }
    }

    fn same_client(a: &Arc<dyn MatchFunctionClient>, b: &Arc<dyn MatchFunctionClient>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
    }

    #[test]
    fn test_rest_client_is_cached() {
        let cache = ClientCache::with_transports(
            TlsSettings::default(),
            FunctionClientSettings::default(),
        );
        let first = cache.get_client(&key(TransportKind::Rest)).unwrap();
        let second = cache.get_client(&key(TransportKind::Rest)).unwrap();

        assert!(same_client(&first, &second));
        assert_eq!(first.kind(), TransportKind::Rest);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rpc_client_is_cached() {
        let cache = ClientCache::with_transports(
            TlsSettings::default(),
            FunctionClientSettings::default(),
        );
        let first = cache.get_client(&key(TransportKind::Rpc)).unwrap();
        let second = cache.get_client(&key(TransportKind::Rpc)).unwrap();

        assert!(same_client(&first, &second));
        assert_eq!(first.kind(), TransportKind::Rpc);
    }

    #[test]
    fn test_kinds_are_cached_separately() {
        let cache = ClientCache::with_transports(
            TlsSettings::default(),
            FunctionClientSettings::default(),
        );
        let rest = cache.get_client(&key(TransportKind::Rest)).unwrap();
        let rpc = cache.get_client(&key(TransportKind::Rpc)).unwrap();

        assert!(!same_client(&rest, &rpc));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_secure_client_without_trust_material_fails() {
        let tls = TlsSettings {
            enabled: true,
            trusted_certificate_path: Some(PathBuf::from("/nonexistent/parlor/root.pem")),
        };
        let cache = ClientCache::with_transports(tls, FunctionClientSettings::default());

        for kind in [TransportKind::Rest, TransportKind::Rpc] {
            let err = cache.get_client(&key(kind)).err().unwrap();
            assert!(matches!(err, FetchError::InvalidArgument { .. }));
            assert_eq!(err.to_string(), FAILED_TO_CONNECT);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_port_is_never_cached() {
        let cache = ClientCache::with_transports(
            TlsSettings::default(),
            FunctionClientSettings::default(),
        );

        for kind in [TransportKind::Rest, TransportKind::Rpc] {
            for port in [-1, 70000] {
                let bad = ClientKey {
                    kind,
                    host: "om-test".to_string(),
                    port,
                };
                let err = cache.get_client(&bad).err().unwrap();
                assert_eq!(err.to_string(), FAILED_TO_CONNECT);
            }
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sequential_access_constructs_once() {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone());

        for _ in 0..10 {
            cache.get_client(&key(TransportKind::Rest)).unwrap();
        }
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_access_constructs_once() {
        let factory = Arc::new(CountingFactory::default());
        let cache = Arc::new(ClientCache::new(factory.clone()));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                tokio::task::spawn_blocking(move || {
                    cache.get_client(&key(TransportKind::Rest)).unwrap()
                })
            })
            .collect();

        let clients: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| same_client(c, &clients[0])));
        assert!(cache.contains(&key(TransportKind::Rest)));
    }
}
