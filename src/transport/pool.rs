//! Transport handle cache with configuration-driven invalidation

use super::{Transport, TransportConfig, TransportFactory};
use crate::error::Result;
use crate::validation::normalize_endpoint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

struct PoolState {
    config: TransportConfig,
    handles: HashMap<String, Arc<dyn Transport>>,
    generation: u64,
}

/// Owns the live [`TransportConfig`] and the handles built from it.
///
/// Configuration and handles share one lock, held only for lookups and
/// inserts. Every configuration change drops all cached handles and bumps the
/// generation; a handle built from an older generation is never cached.
pub struct TransportPool {
    factory: Arc<dyn TransportFactory>,
    state: Mutex<PoolState>,
}

impl TransportPool {
    pub fn new(factory: Arc<dyn TransportFactory>, config: TransportConfig) -> Self {
        Self {
            factory,
            state: Mutex::new(PoolState {
                config,
                handles: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> TransportConfig {
        self.lock().config.clone()
    }

    /// Mutate the configuration and invalidate every cached handle
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut TransportConfig),
    {
        let mut state = self.lock();
        mutate(&mut state.config);
        let dropped = state.handles.len();
        state.handles.clear();
        state.generation += 1;
        info!(
            "Transport configuration changed (generation {}), dropped {} cached handle(s)",
            state.generation, dropped
        );
    }

    /// Cached handle for `endpoint`, built from the current config if absent
    ///
    /// The handle is built outside the lock from a config snapshot and only
    /// cached if no configuration change happened meanwhile; otherwise it is
    /// rebuilt from the newer settings.
    pub fn transport_for(&self, endpoint: &str) -> Result<Arc<dyn Transport>> {
        let key = normalize_endpoint(endpoint);

        loop {
            let (config, generation) = {
                let state = self.lock();
                if let Some(handle) = state.handles.get(&key) {
                    return Ok(handle.clone());
                }
                (state.config.clone(), state.generation)
            };

            debug!("Building transport for {} (generation {})", key, generation);
            let handle = self.factory.build(endpoint, &config)?;

            let mut state = self.lock();
            if state.generation != generation {
                debug!(
                    "Configuration changed while building transport for {}, rebuilding",
                    key
                );
                continue;
            }
            // A concurrent build for the same key may have won; keep the first.
            return Ok(state.handles.entry(key).or_insert(handle).clone());
        }
    }

    /// Number of configuration changes since construction
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn cached_handles(&self) -> usize {
        self.lock().handles.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
