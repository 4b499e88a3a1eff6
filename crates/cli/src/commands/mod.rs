pub mod config_cmd;
pub mod doctor;
pub mod onboard;
pub mod run;
pub mod sessions;

use sentient_config::AppConfig;
use sentient_core::memory::MemoryStore;
use std::sync::Arc;

/// Open the session store named by the configuration.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn MemoryStore>, Box<dyn std::error::Error>> {
    let url = config.memory.resolved_database_url();
    let store = sentient_memory::connect(&url, config.memory.max_connections)
        .await
        .map_err(|e| format!("Failed to open session store: {e}"))?;
    Ok(store)
}
