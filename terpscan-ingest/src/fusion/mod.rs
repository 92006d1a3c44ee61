//! Fusion of per-segment extraction output

pub mod menu_deduplicator;

pub use menu_deduplicator::{merge, normalize_name};
