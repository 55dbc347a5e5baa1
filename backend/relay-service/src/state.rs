use crate::{
    config::Config,
    error::{AppError, AppResult},
    relay::{broadcast::BroadcastRouter, message_types::LineFormatter, Registry},
};
use crypto_core::{KeyProvisioner, KeySource};
use std::sync::Arc;

/// Shared handles passed to every connection task
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub router: BroadcastRouter,
    pub provisioner: Arc<dyn KeySource>,
}

impl AppState {
    pub fn new(config: Config) -> AppResult<Self> {
        let provisioner = KeyProvisioner::new(config.key_bits)
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(Self::with_key_source(config, Arc::new(provisioner)))
    }

    /// Build state around an existing key source instead of one derived from `config`
    pub fn with_key_source(config: Config, provisioner: Arc<dyn KeySource>) -> Self {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(config.ansi_colors));

        Self {
            config: Arc::new(config),
            registry,
            router,
            provisioner,
        }
    }

    pub fn formatter(&self) -> LineFormatter {
        self.router.formatter()
    }
}
