//! # Utilities
pub mod params;
pub mod prefab;
