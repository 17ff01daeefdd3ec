//! Application configuration

use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::application::services::EngineSettings;
use crate::domain::entities::StoreEnvironment;

/// Application configuration loaded from `ADVENTURE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SQLite content store URL
    pub database_url: String,
    /// HTTP server port
    pub server_port: u16,

    /// Destination world identifier
    pub world_id: String,
    /// Game system bundles must match
    pub system_id: String,
    pub system_version: String,
    pub core_version: String,
    /// Modules recorded in exported manifests
    #[serde(default)]
    pub active_modules: Vec<String>,

    /// Root directory of imported assets
    pub asset_root: String,
    pub max_folder_depth: usize,
    pub revisit_timeout_secs: u64,
    /// Largest accepted import upload
    pub max_upload_mb: usize,
    /// Largest total size an uploaded archive may decompress to
    pub max_unpacked_mb: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix("ADVENTURE"))
    }

    fn load(environment: Environment) -> Result<Self> {
        Config::builder()
            .set_default("database_url", "sqlite://adventure.db?mode=rwc")?
            .set_default("server_port", 3000)?
            .set_default("world_id", "world")?
            .set_default("system_id", "dnd5e")?
            .set_default("system_version", "1.0.0")?
            .set_default("core_version", "0.7.9")?
            .set_default("active_modules", Vec::<String>::new())?
            .set_default("asset_root", "adventures")?
            .set_default("max_folder_depth", 3)?
            .set_default("revisit_timeout_secs", 60)?
            .set_default("max_upload_mb", 256)?
            .set_default("max_unpacked_mb", 1024)?
            .add_source(
                environment
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("active_modules"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Identity of the world served by the content store
    pub fn environment(&self) -> StoreEnvironment {
        StoreEnvironment {
            world_id: self.world_id.clone(),
            system_id: self.system_id.clone(),
            system_version: self.system_version.clone(),
            core_version: self.core_version.clone(),
            active_modules: self
                .active_modules
                .iter()
                .map(|module| module.trim())
                .filter(|module| !module.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            asset_root: self.asset_root.clone(),
            max_folder_depth: self.max_folder_depth,
            revisit_timeout: Duration::from_secs(self.revisit_timeout_secs),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn max_unpacked_bytes(&self) -> u64 {
        self.max_unpacked_mb.saturating_mul(1024 * 1024)
    }
}
