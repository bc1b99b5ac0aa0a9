//! # Inbound Ports (Driving Ports / API)
//!
//! The API a transport layer drives. Implementations must be `Send + Sync`;
//! independent envelopes may be processed concurrently.

use async_trait::async_trait;
use pap_types::{Envelope, PapError};

use crate::domain::outcome::{Outcome, Rejection, SweepReport};
use crate::domain::streaming::ChunkStream;

#[async_trait]
pub trait EnvelopeProcessingApi: Send + Sync {
    /// Validate, authenticate and route one envelope.
    async fn process(&self, envelope: Envelope) -> Result<Outcome, Rejection>;

    /// Decode the wire form, then `process`.
    async fn process_wire(&self, bytes: &[u8]) -> Result<Outcome, Rejection>;

    /// Consumer side of a correlation's chunk stream. Once per correlation.
    fn take_stream(&self, correlation_id: &str) -> Option<ChunkStream>;

    /// Cancel a pending exchange. No timeout is synthesized for it.
    async fn cancel(&self, correlation_id: &str) -> Result<(), PapError>;

    /// Withdraw a scheduled directive by its control envelope id.
    fn cancel_directive(&self, message_id: &str) -> Result<(), PapError>;

    /// Lazy maintenance against the engine clock.
    async fn sweep(&self) -> SweepReport;
}
