//! Domain layer - Core data model with no I/O
//!
//! This layer contains:
//! - Entities: Document, Folder, BundleManifest, BundleArchive, CollectionInfo
//! - Value Objects: DocumentKind, asset paths, reference tokens, partial updates

pub mod entities;
pub mod value_objects;
