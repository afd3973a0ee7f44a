//! Application state shared by the CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use autoflow_core::resilience::ResilienceRegistry;
use autoflow_infra::config::{load_global_config, resolve_data_dir};
use autoflow_types::config::GlobalConfig;

/// Loaded configuration plus the process-wide resilience registry.
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub registry: Arc<ResilienceRegistry>,
}

impl AppState {
    /// Resolve the data directory and load `config.toml` from it.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_global_config(&data_dir).await;
        tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");

        let registry = Arc::new(ResilienceRegistry::new(config.resilience.clone()));

        Ok(Self {
            data_dir,
            config,
            registry,
        })
    }
}
