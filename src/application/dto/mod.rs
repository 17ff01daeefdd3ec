//! Data Transfer Objects - For API boundaries
//!
//! DTOs live in the application layer so infrastructure (HTTP) can
//! serialize/deserialize requests and summaries without reaching into services.

pub mod adventure;

pub use adventure::*;
