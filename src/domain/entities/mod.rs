//! Domain entities - Core objects moved between content stores

mod bundle_archive;
mod collection;
mod document;
mod folder;
mod manifest;

pub use bundle_archive::{BundleArchive, BUNDLE_EXTENSION, FOLDERS_FILE, MANIFEST_FILE};
pub use collection::{BundledCollection, CollectionInfo, WORLD_PACKAGE};
pub use document::{
    import_id_of, payload_has_reference, stamp_import_id, Document, DocumentSummary,
    IMPORT_ID_FLAG,
};
pub use folder::{Folder, FolderRecord, NewFolder};
pub use manifest::{BundleManifest, BundleOptions, StoreEnvironment, SCHEMA_VERSION};
