//! # Integration Scenarios
//!
//! Every scenario drives a real `EnvelopeEngine` through its inbound port,
//! with signed envelopes and in-memory collaborators.

pub mod fixtures;

mod control;
mod flows;
mod security;
mod wire;
