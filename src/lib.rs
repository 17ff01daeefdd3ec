//! WrldBldr Adventure - Portable adventure bundles for TTRPG world databases
//!
//! Exports a selection of documents, folders, collection packs and the assets
//! they use from one content store into a self-contained zip bundle, and
//! imports such a bundle into another store, rewriting every cross-reference
//! to the ids the destination assigns.

pub mod application;
pub mod domain;
pub mod infrastructure;
