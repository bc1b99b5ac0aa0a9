//! # Adapters Module
//!
//! In-process implementations of the outbound ports. Production hosts swap
//! in their own registry, directory and delivery; tests use these as is.

pub mod clock;
pub mod delivery;
pub mod directory;
pub mod keys;
