//! # terpscan common library
//!
//! Shared code for the terpscan crates:
//! - Common error type
//! - TOML configuration loading and config-file resolution
//! - The fixed 11-terpene schema every strain vector is expressed in

pub mod config;
pub mod error;
pub mod terpenes;

pub use error::{Error, Result};
pub use terpenes::{Terpene, TerpeneProfile, TERPENE_COUNT};
