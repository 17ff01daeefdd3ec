//! Application services - Use case implementations
//!
//! The export/import engine: operation-scoped helpers (id map, asset
//! relocator, folder tree builder, revisit queue), the per-kind strategy
//! registry, the writer/reader/resolver passes, and the facade tying them
//! together.

pub mod adventure_service;
pub mod asset_relocator;
pub mod bundle_reader;
pub mod bundle_writer;
pub mod collection_importer;
pub mod errors;
pub mod folder_tree;
pub mod id_map;
pub mod kind_strategy;
pub mod progress;
pub mod reference_resolver;
pub mod revisit_queue;

pub use adventure_service::{AdventureService, AdventureServiceImpl, EngineSettings};
pub use errors::AdventureError;
pub use kind_strategy::{KindRegistry, KindStrategy};
pub use progress::{Progress, ProgressTracker};
