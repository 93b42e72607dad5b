//! The set of sources a server instance serves.
//!
//! The registry is built once at startup from the configuration file and
//! never changes afterwards. It is shared by `Arc` between request handlers
//! without any locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::{Layer, ServiceProperties, Source, SourceConfiguration, TileSource};

/// Initialized sources, in configuration order.
pub struct SourceRegistry {
    service: ServiceProperties,
    sources: Vec<Arc<Source>>,
    index: HashMap<String, usize>,
    failures: Vec<(String, String)>,
}

impl SourceRegistry {
    /// Initialize every configured source.
    ///
    /// Entries with an empty or duplicate id are skipped. Sources initialize
    /// concurrently; one that fails is logged and left out, the rest are
    /// kept in configuration order.
    pub async fn init(
        service: ServiceProperties,
        configs: Vec<SourceConfiguration>,
        http: &reqwest::Client,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for config in configs {
            if config.id.trim().is_empty() {
                warn!(location = %config.location, "Skipping source without an id");
                continue;
            }
            if !seen.insert(config.id.clone()) {
                warn!(source_id = %config.id, "Skipping duplicate source id");
                continue;
            }

            let id = config.id.clone();
            let http = http.clone();
            let handle = tokio::spawn(async move { Source::init(config, &http).await });
            pending.push((id, handle));
        }

        let mut sources = Vec::new();
        let mut index = HashMap::new();
        let mut failures = Vec::new();

        for (id, handle) in pending {
            let message = match handle.await {
                Ok(Ok(source)) => {
                    index.insert(id, sources.len());
                    sources.push(Arc::new(source));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("initialization task failed: {}", e),
            };
            error!(source_id = %id, error = %message, "Source initialization failed");
            failures.push((id, message));
        }

        info!(
            sources = sources.len(),
            failed = failures.len(),
            "Source registry initialized"
        );

        Self {
            service,
            sources,
            index,
            failures,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Source>> {
        self.index.get(id).map(|&i| Arc::clone(&self.sources[i]))
    }

    /// Finalized configurations, in configuration order.
    pub fn sources(&self) -> Vec<SourceConfiguration> {
        self.sources
            .iter()
            .map(|s| s.configuration().clone())
            .collect()
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.sources
            .iter()
            .map(|s| s.configuration().layer())
            .collect()
    }

    pub fn service(&self) -> &ServiceProperties {
        &self.service
    }

    /// Ids and error messages of sources that failed to initialize.
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
