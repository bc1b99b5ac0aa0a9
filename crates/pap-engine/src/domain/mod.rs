//! # Domain Layer
//!
//! The envelope pipeline stages. No transport, no storage: collaborators
//! arrive through the outbound ports.
//!
//! ```text
//! validator ──► auth ──► replay
//!     │
//!     ├─ invoke ──► dispatch ──► correlation ──► streaming
//!     ├─ response / error / handshake_ack ──► correlation ──► streaming
//!     └─ control ──► control (timers) ──► delivery port
//! ```

pub mod auth;
pub mod config;
pub mod control;
pub mod correlation;
pub mod dispatch;
pub mod errors;
pub mod outcome;
pub mod replay;
pub mod streaming;
pub mod validator;
