// SCA Core - memory data model
//!
//! Contains:
//! - Importance: bounded 1..=5 importance level
//! - MemoryEntry / MemoryView: persisted records and their projections
//! - MemoryStats / MemoryPatterns: aggregates over the store
//! - MemoryConfig: store configuration

mod error;
mod memory;
mod config;

pub use error::*;
pub use memory::*;
pub use config::*;
