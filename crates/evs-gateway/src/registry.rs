//! Destination client registry
//!
//! Lazily creates and caches one client per destination, guaranteeing that
//! concurrent first-time requests for the same destination run the creation
//! routine at most once (single-flight per key). Creation failures are not
//! cached, so a later request retries provisioning.

use evs_gateway_core::prelude::*;
use evs_gateway_core::RegistryMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

type ClientCell<C> = Arc<OnceCell<Arc<C>>>;

/// Concurrency-safe get-or-create cache of destination clients
pub struct ClientRegistry<F: ClientFactory> {
    factory: F,
    cells: Mutex<HashMap<String, ClientCell<F::Client>>>,
    metrics: RegistryMetrics,
}

impl<F: ClientFactory> ClientRegistry<F> {
    /// Create a registry over the given client factory
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            cells: Mutex::new(HashMap::new()),
            metrics: RegistryMetrics::new("client_registry"),
        }
    }

    /// Get the client for a destination, creating it on first use
    ///
    /// A second caller arriving while creation is in flight waits for that
    /// creation instead of triggering another one. If creation fails, the
    /// slot stays empty and the next caller retries.
    pub async fn get_or_create(&self, destination: &str) -> Result<Arc<F::Client>> {
        let cell = {
            let mut cells = self
                .cells
                .lock()
                .map_err(|_| GatewayError::Internal("client registry lock poisoned".to_string()))?;
            cells.entry(destination.to_string()).or_default().clone()
        };

        let client = cell
            .get_or_try_init(|| async {
                debug!(destination, "Creating destination client");
                let client = self.factory.create(destination).await?;
                info!(destination, "Destination client created");
                self.metrics.record_created();
                Ok::<_, GatewayError>(Arc::new(client))
            })
            .await?;

        self.metrics.set_clients(self.ready_count());
        Ok(client.clone())
    }

    /// Snapshot of all currently created clients, for shutdown/flush
    ///
    /// Does not block concurrent `get_or_create` calls; clients still being
    /// created are not included.
    pub fn get_all(&self) -> Vec<Arc<F::Client>> {
        match self.cells.lock() {
            Ok(cells) => cells.values().filter_map(|c| c.get().cloned()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of clients that finished creation
    pub fn ready_count(&self) -> usize {
        self.cells
            .lock()
            .map(|cells| cells.values().filter(|c| c.get().is_some()).count())
            .unwrap_or(0)
    }
}
