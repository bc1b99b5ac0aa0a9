//! # PAP Test Suite
//!
//! Unified test crate for the envelope engine.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # Engine wired to in-memory adapters
//!     ├── flows.rs      # Invoke / response / timeout choreography
//!     ├── control.rs    # Directives, ping and force_kill
//!     ├── security.rs   # Tampering, replay and freshness attacks
//!     └── wire.rs       # Wire decoding through the engine
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pap-tests
//!
//! # By category
//! cargo test -p pap-tests integration::security::
//!
//! # Benchmarks
//! cargo bench -p pap-tests
//! ```

#![allow(dead_code)]

pub mod integration;
