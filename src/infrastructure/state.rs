//! Shared application state

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;

use crate::application::services::{AdventureService, AdventureServiceImpl};
use crate::infrastructure::archive::ZipArchiveCodec;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::persistence::SqliteContentStore;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub adventure_service: Arc<dyn AdventureService>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open content store at {}", config.database_url))?;
        let store = SqliteContentStore::new(pool, config.environment()).await?;

        let adventure_service = AdventureServiceImpl::new(
            Arc::new(store),
            Arc::new(ZipArchiveCodec::new(config.max_unpacked_bytes())),
            config.engine_settings(),
        );

        Ok(Self::with_service(config, Arc::new(adventure_service)))
    }

    /// State around an already built service
    pub fn with_service(config: AppConfig, adventure_service: Arc<dyn AdventureService>) -> Self {
        Self {
            config,
            adventure_service,
        }
    }
}
