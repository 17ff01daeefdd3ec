//! Outbound ports - Interfaces that the application requires from external systems

mod archive_port;
mod content_store_port;

pub use archive_port::ArchiveCodecPort;
pub use content_store_port::{BrowseOptions, ContentStorePort, StorageArea};
