//! Bundle manifest and the environment descriptor of a content store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload schema version written by this crate
pub const SCHEMA_VERSION: u32 = 1;

/// Contents of `adventure.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Game system the bundle was exported from
    pub system: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default = "default_schema_version")]
    pub version: u32,
    #[serde(default)]
    pub options: BundleOptions,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Options recorded at export time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOptions {
    /// Whether `folders.json` was written and documents keep their folder keys
    #[serde(default)]
    pub folders: bool,
}

/// Identity of the world a content store serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEnvironment {
    pub world_id: String,
    pub system_id: String,
    pub system_version: String,
    pub core_version: String,
    #[serde(default)]
    pub active_modules: Vec<String>,
}

impl StoreEnvironment {
    /// Provenance stamp written into `flags.exportSource`
    pub fn export_source(&self) -> serde_json::Value {
        serde_json::json!({
            "world": self.world_id,
            "system": self.system_id,
            "coreVersion": self.core_version,
            "systemVersion": self.system_version,
        })
    }
}
