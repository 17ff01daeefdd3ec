//! Ports - Interfaces between the application and its adapters

pub mod outbound;
