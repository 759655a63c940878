//! Shared state behind every loader: configuration, the TLS client setup,
//! and a bound on concurrent connections.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::TransportConfig;
use crate::error::NetError;
use crate::loader::UrlLoader;
use crate::tls::TlsTransport;

#[derive(Debug, Clone)]
pub struct NetworkService {
    config: Arc<TransportConfig>,
    tls: TlsTransport,
    slots: Arc<Semaphore>,
}

impl NetworkService {
    /// Service with webpki roots and the build-time trust policy.
    pub fn new(config: TransportConfig) -> Result<Self, NetError> {
        Ok(Self::with_tls(config, TlsTransport::new()?))
    }

    pub fn with_tls(config: TransportConfig, tls: TlsTransport) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_loads.max(1)));
        log::debug!("network service with {} load slots", config.max_concurrent_loads);
        Self {
            config: Arc::new(config),
            tls,
            slots,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn create_url_loader(&self) -> UrlLoader {
        UrlLoader::new(self.config.clone(), self.tls.clone(), self.slots.clone())
    }

    /// Slots not held by a running hop.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
