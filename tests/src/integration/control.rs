//! # Control Plane Scenarios
//!
//! `supervisor` issues directives against `worker-1`: immediate and
//! scheduled release, withdrawal, `force_kill` of a running exchange and
//! the ping / handshake_ack liveness exchange.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use pap_bus::{EngineEvent, EventFilter, EventTopic, RetirementReason};
    use pap_engine::{
        Disposition, EnvelopeProcessingApi, WarningKind, FORCE_KILL_CORRELATION_ARG,
    };
    use pap_types::{ControlDirective, ControlType, ErrorCode, JsonObject, PapError};
    use serde_json::json;

    use crate::integration::fixtures::World;

    fn handle_of(disposition: &Disposition) -> &pap_engine::DirectiveHandle {
        match disposition {
            Disposition::DirectiveScheduled { handle, .. } => handle,
            other => panic!("expected a scheduled directive, got {other:?}"),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_directive_without_enforce_at_released_immediately() {
        let world = World::new();
        let mut control = world.subscribe(EventFilter::topics(vec![EventTopic::Control]));

        let outcome = world
            .engine
            .process(world.control(ControlDirective::new(ControlType::Pause)))
            .await
            .unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::DirectiveScheduled { released: true, .. }
        ));

        let delivered = world.delivery.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].control_type, ControlType::Pause);
        assert_eq!(delivered[0].requester, *world.supervisor.identity());
        assert!(matches!(
            control.try_recv().unwrap(),
            Some(EngineEvent::DirectiveReleased { .. })
        ));
    }

    #[tokio::test]
    async fn test_future_directive_released_once_not_before_enforce_at() {
        let world = World::new();
        let enforce_at = world.now() + TimeDelta::seconds(60);
        let outcome = world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::Terminate).with_enforce_at(enforce_at),
            ))
            .await
            .unwrap();
        let handle = handle_of(&outcome.disposition).clone();
        assert!(!handle.is_released());
        assert_eq!(world.engine.pending_directives(), 1);

        world.clock.advance(Duration::from_secs(59));
        assert_eq!(world.engine.sweep().await.released, 0);
        assert!(world.delivery.delivered().is_empty());

        world.clock.advance(Duration::from_secs(1));
        assert_eq!(world.engine.sweep().await.released, 1);
        assert_eq!(world.engine.sweep().await.released, 0);

        let delivered = world.delivery.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].enforce_at, Some(enforce_at));
        assert!(delivered[0].released_at >= enforce_at);
        assert!(handle.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_directive_released_by_timer() {
        let world = World::new();
        let enforce_at = world.now() + TimeDelta::seconds(5);
        world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::Resume).with_enforce_at(enforce_at),
            ))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(world.delivery.delivered().is_empty());

        world.clock.advance(Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(world.delivery.delivered().len(), 1);
        assert_eq!(world.engine.sweep().await.released, 0);
    }

    #[tokio::test]
    async fn test_withdrawn_directive_never_delivered() {
        let world = World::new();
        let enforce_at = world.now() + TimeDelta::seconds(10);
        let outcome = world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::Pause).with_enforce_at(enforce_at),
            ))
            .await
            .unwrap();

        world.engine.cancel_directive(&outcome.message_id).unwrap();
        let again = world.engine.cancel_directive(&outcome.message_id).unwrap_err();
        assert_eq!(again.code, ErrorCode::Conflict);

        world.clock.advance(Duration::from_secs(30));
        world.engine.sweep().await;
        assert!(world.delivery.delivered().is_empty());
        assert_eq!(
            world.engine.cancel_directive("unknown").unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn test_released_directive_cannot_be_withdrawn() {
        let world = World::new();
        let outcome = world
            .engine
            .process(world.control(ControlDirective::new(ControlType::Pause)))
            .await
            .unwrap();
        let err = world.engine.cancel_directive(&outcome.message_id).unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_delivery_failure_rejects_directive() {
        let world = World::new();
        world
            .delivery
            .fail_with(PapError::new(ErrorCode::ProxyError, "gateway down"));

        let rejection = world
            .engine
            .process(world.control(ControlDirective::new(ControlType::Terminate)))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, ErrorCode::ProxyError);
        assert_eq!(world.engine.pending_directives(), 0);
    }

    // =========================================================================
    // FORCE KILL
    // =========================================================================

    #[tokio::test]
    async fn test_force_kill_cancels_named_exchange() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::all());
        let id = world
            .engine
            .process(world.invoke(TimeDelta::milliseconds(200)))
            .await
            .unwrap()
            .correlation_id;

        let mut arguments = JsonObject::new();
        arguments.insert(FORCE_KILL_CORRELATION_ARG.to_string(), json!(id.clone()));
        let outcome = world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::ForceKill).with_arguments(arguments),
            ))
            .await
            .unwrap();

        let Disposition::DirectiveScheduled {
            handle,
            cancelled_exchange,
            ..
        } = &outcome.disposition
        else {
            panic!("expected a scheduled directive");
        };
        assert_eq!(cancelled_exchange.as_deref(), Some(id.as_str()));
        assert!(!handle.cancelable());
        assert!(!world.engine.is_pending(&id));

        let delivered = world.delivery.delivered();
        assert!(delivered[0].bypass_grace_period);
        assert!(!delivered[0].cancelable);

        world.clock.advance(Duration::from_secs(1));
        world.engine.sweep().await;
        let received = events.drain();
        assert!(!received
            .iter()
            .any(|e| matches!(e, EngineEvent::ExchangeTimedOut { .. })));
        assert!(received.contains(&EngineEvent::ExchangeRetired {
            correlation_id: id,
            reason: RetirementReason::Cancelled,
        }));
    }

    #[tokio::test]
    async fn test_undelivered_force_kill_leaves_exchange_pending() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::topics(vec![EventTopic::Correlation]));
        let id = world
            .engine
            .process(world.invoke(TimeDelta::seconds(30)))
            .await
            .unwrap()
            .correlation_id;
        world
            .delivery
            .fail_with(PapError::new(ErrorCode::ProxyError, "gateway down"));

        let mut arguments = JsonObject::new();
        arguments.insert(FORCE_KILL_CORRELATION_ARG.to_string(), json!(id.clone()));
        let rejection = world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::ForceKill).with_arguments(arguments),
            ))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, ErrorCode::ProxyError);
        assert!(world.engine.is_pending(&id));
        assert!(!events
            .drain()
            .iter()
            .any(|e| matches!(e, EngineEvent::ExchangeRetired { .. })));

        // The exchange still completes normally
        world.delivery.recover();
        let done = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"finished"))
            .await
            .unwrap();
        assert!(matches!(
            done.disposition,
            Disposition::ResponseMatched { retired: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_scheduled_force_kill_not_cancelable() {
        let world = World::new();
        let outcome = world
            .engine
            .process(world.control(
                ControlDirective::new(ControlType::ForceKill)
                    .with_enforce_at(world.now() + TimeDelta::seconds(30)),
            ))
            .await
            .unwrap();
        let err = world.engine.cancel_directive(&outcome.message_id).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(world.engine.pending_directives(), 1);
    }

    // =========================================================================
    // PING / HANDSHAKE
    // =========================================================================

    #[tokio::test]
    async fn test_ping_answered_by_handshake_ack() {
        let world = World::new();
        let ping = world.control(ControlDirective::new(ControlType::Ping));
        let id = world.engine.process(ping).await.unwrap().correlation_id;
        assert!(world.engine.is_pending(&id));

        let outcome = world.engine.process(world.ack(&id, true)).await.unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::HandshakeAcked { accepted: true }
        ));
        assert!(!world.engine.is_pending(&id));

        let again = world.engine.process(world.ack(&id, true)).await.unwrap();
        assert_eq!(again.warnings[0].kind, WarningKind::DuplicateTerminal);
    }

    #[tokio::test]
    async fn test_unanswered_ping_times_out_after_ping_timeout() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::topics(vec![EventTopic::Correlation]));
        let ping = world.control(ControlDirective::new(ControlType::Ping));
        let id = world.engine.process(ping).await.unwrap().correlation_id;

        let ping_timeout = world.engine.config().ping_timeout;
        world.clock.advance(ping_timeout - Duration::from_secs(1));
        assert_eq!(world.engine.sweep().await.timed_out, 0);

        world.clock.advance(Duration::from_secs(1));
        assert_eq!(world.engine.sweep().await.timed_out, 1);
        assert!(events.drain().contains(&EngineEvent::ExchangeRetired {
            correlation_id: id,
            reason: RetirementReason::Timeout,
        }));
    }
}
