//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Archive: zip container for adventure bundles
//! - Persistence: in-memory and SQLite content stores
//! - HTTP: REST API routes
//! - Config: Application configuration
//! - State: Shared application state

pub mod archive;
pub mod config;
pub mod http;
pub mod persistence;
pub mod state;
