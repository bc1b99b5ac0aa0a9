//! # Test Fixtures
//!
//! A `World` is one engine plus the handles tests need to steer it: the
//! manual clock, the event bus, the directory and a few signing agents.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use pap_bus::{EventFilter, EventSubscriber, InMemoryEventBus, Subscription};
use pap_crypto::{EnvelopeSigner, P256KeyPair, SigningKeyPair};
use pap_engine::{
    Clock, EngineConfig, EngineDeps, EnvelopeEngine, InMemoryDirectory, InMemoryKeyRegistry,
    ManualClock, RecordingDelivery,
};
use pap_types::{
    AgentIdentity, ControlDirective, Envelope, ErrorCode, ErrorMessage, HandshakeAck, Invoke,
    MessageBody, OutputChunk, Response, Target,
};

pub const CLUSTER: &str = "cluster-a";
pub const WORKER: &str = "worker-1";
pub const METHOD: &str = "analyze";

pub struct World {
    pub engine: EnvelopeEngine,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<InMemoryEventBus>,
    pub delivery: Arc<RecordingDelivery>,
    pub directory: Arc<InMemoryDirectory>,
    pub keys: Arc<InMemoryKeyRegistry>,
    /// `focus` in `cluster-a`, Ed25519.
    pub focus: EnvelopeSigner,
    /// `worker-1` in `cluster-a`, ECDSA P-256.
    pub worker: EnvelopeSigner,
    /// `supervisor` in `cluster-a`, Ed25519.
    pub supervisor: EnvelopeSigner,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let bus = Arc::new(InMemoryEventBus::new());
        let delivery = Arc::new(RecordingDelivery::new());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.register_agent(WORKER, None, "tcp://worker-1:7000", [METHOD]);

        let focus = EnvelopeSigner::ed25519(AgentIdentity::new("focus", CLUSTER));
        let worker = EnvelopeSigner::new(
            AgentIdentity::new(WORKER, CLUSTER),
            SigningKeyPair::P256(P256KeyPair::generate()),
        );
        let supervisor = EnvelopeSigner::ed25519(AgentIdentity::new("supervisor", CLUSTER));

        let keys = Arc::new(InMemoryKeyRegistry::new());
        keys.register_signer(&focus);
        keys.register_signer(&worker);
        keys.register_signer(&supervisor);

        let engine = EnvelopeEngine::new(
            config,
            EngineDeps {
                clock: clock.clone(),
                keys: keys.clone(),
                directory: directory.clone(),
                delivery: delivery.clone(),
                publisher: bus.clone(),
            },
        )
        .expect("test config is valid");

        Self {
            engine,
            clock,
            bus,
            delivery,
            directory,
            keys,
            focus,
            worker,
            supervisor,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// `focus` asks `worker-1` to analyze, due in `deadline`.
    pub fn invoke(&self, deadline: TimeDelta) -> Envelope {
        let body = MessageBody::Invoke(
            Invoke::new(Target::agent(WORKER), METHOD).with_deadline(self.now() + deadline),
        );
        self.focus.sign_at(body, self.now()).expect("signing")
    }

    /// `worker-1` answers `correlation_id` with one chunk.
    pub fn response(
        &self,
        correlation_id: &str,
        status: ErrorCode,
        is_final: bool,
        data: &[u8],
    ) -> Envelope {
        let body = MessageBody::Response(
            Response::new(status)
                .with_final(is_final)
                .with_outputs(vec![OutputChunk::new("text/plain", data.to_vec())]),
        );
        self.worker
            .sign_at(body, self.now())
            .expect("signing")
            .with_correlation(correlation_id)
    }

    pub fn error(&self, correlation_id: &str, code: ErrorCode, message: &str) -> Envelope {
        let body = MessageBody::Error(ErrorMessage {
            code,
            message: message.into(),
            recoverable: None,
            details: None,
        });
        self.worker
            .sign_at(body, self.now())
            .expect("signing")
            .with_correlation(correlation_id)
    }

    pub fn ack(&self, correlation_id: &str, accepted: bool) -> Envelope {
        let body = MessageBody::HandshakeAck(HandshakeAck {
            accepted,
            reason: None,
        });
        self.worker
            .sign_at(body, self.now())
            .expect("signing")
            .with_correlation(correlation_id)
    }

    pub fn control(&self, directive: ControlDirective) -> Envelope {
        self.supervisor
            .sign_at(MessageBody::Control(directive), self.now())
            .expect("signing")
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
