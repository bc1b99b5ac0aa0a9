//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: API the transport layer calls
//! - **Outbound (Driven)**: collaborators the engine needs

pub mod inbound;
pub mod outbound;
