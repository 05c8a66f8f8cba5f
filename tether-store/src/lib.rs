//! # tether-store
//!
//! Local record store for tether.
//!
//! This crate provides:
//! - The async [`Store`] façade over models, prompts and chat history
//! - The [`StorageEngine`] seam
//! - A volatile [`MemoryEngine`] and a checksummed JSON [`FileEngine`]

pub mod engine;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use engine::{EngineKind, StorageEngine};
pub use error::StorageError;
pub use file::FileEngine;
pub use memory::MemoryEngine;
pub use store::Store;
