//! # Invoke / Response Choreography
//!
//! `focus` invokes `worker-1`; the worker answers with zero or more
//! non-final chunks and one terminal reply. Covers the clean path, the
//! streaming order guarantees, timeouts, errors and explicit cancellation.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use pap_bus::{EngineEvent, EventFilter, EventTopic, RetirementReason};
    use pap_engine::{AgentHealth, Disposition, EngineConfig, EnvelopeProcessingApi, WarningKind};
    use pap_types::{ErrorCode, Invoke, MessageBody, Target};
    use tokio_stream::StreamExt;

    use crate::integration::fixtures::{World, METHOD, WORKER};

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // =========================================================================
    // CLEAN EXCHANGES
    // =========================================================================

    #[tokio::test]
    async fn test_accepted_then_ok_retires_without_timeout() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::topics(vec![EventTopic::Correlation]));

        let invoke = world.invoke(TimeDelta::seconds(5));
        let outcome = world.engine.process(invoke.clone()).await.unwrap();
        let Disposition::Dispatched {
            destination,
            awaiting_reply,
            deadline,
        } = &outcome.disposition
        else {
            panic!("expected dispatch, got {:?}", outcome.disposition);
        };
        assert_eq!(destination.agent, WORKER);
        assert!(*awaiting_reply);
        assert_eq!(*deadline, Some(world.now() + TimeDelta::seconds(5)));

        let id = outcome.correlation_id;
        let mut stream = world.engine.take_stream(&id).unwrap();

        world
            .engine
            .process(world.response(&id, ErrorCode::Accepted, false, b"working"))
            .await
            .unwrap();
        let done = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"result"))
            .await
            .unwrap();
        assert!(matches!(
            done.disposition,
            Disposition::ResponseMatched { retired: true, .. }
        ));
        assert!(!done.has_warnings());
        assert!(!world.engine.is_pending(&id));

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().data, b"working");
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().data, b"result");
        assert!(stream.next_chunk().await.is_none());

        let received = events.drain();
        assert!(!received
            .iter()
            .any(|e| matches!(e, EngineEvent::ExchangeTimedOut { .. })));
        assert!(received.contains(&EngineEvent::ExchangeRetired {
            correlation_id: id,
            reason: RetirementReason::Final,
        }));
    }

    #[tokio::test]
    async fn test_three_chunks_then_end_and_fourth_conflicts() {
        let world = World::new();
        let id = world
            .engine
            .process(world.invoke(TimeDelta::seconds(30)))
            .await
            .unwrap()
            .correlation_id;
        let stream = world.engine.take_stream(&id).unwrap();

        for (data, is_final) in [(b"c1", false), (b"c2", false), (b"c3", true)] {
            world
                .engine
                .process(world.response(&id, ErrorCode::Ok, is_final, data))
                .await
                .unwrap();
        }

        let rejection = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, false, b"c4"))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Conflict);

        let seen: Vec<Vec<u8>> = stream.map(|item| item.unwrap().data).collect().await;
        assert_eq!(seen, vec![b"c1".to_vec(), b"c2".to_vec(), b"c3".to_vec()]);
    }

    #[tokio::test]
    async fn test_fire_and_forget_invoke_opens_no_exchange() {
        let world = World::new();
        let body = MessageBody::Invoke(
            Invoke::new(Target::agent(WORKER), METHOD).with_expect_reply(false),
        );
        let env = world.focus.sign_at(body, world.now()).unwrap();

        let outcome = world.engine.process(env).await.unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::Dispatched {
                awaiting_reply: false,
                deadline: None,
                ..
            }
        ));
        assert_eq!(world.engine.pending_exchanges(), 0);
        assert!(world.engine.take_stream(&outcome.correlation_id).is_none());
    }

    #[tokio::test]
    async fn test_invoke_without_deadline_gets_default_ttl() {
        let world = World::new();
        let body = MessageBody::Invoke(Invoke::new(Target::agent(WORKER), METHOD));
        let env = world.focus.sign_at(body, world.now()).unwrap();

        let outcome = world.engine.process(env).await.unwrap();
        let ttl = TimeDelta::from_std(world.engine.config().default_exchange_ttl).unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::Dispatched { deadline: Some(at), .. } if at == world.now() + ttl
        ));
    }

    // =========================================================================
    // TIMEOUTS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_invoke_times_out_exactly_once() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::topics(vec![EventTopic::Correlation]));

        let id = world
            .engine
            .process(world.invoke(TimeDelta::milliseconds(100)))
            .await
            .unwrap()
            .correlation_id;
        let mut stream = world.engine.take_stream(&id).unwrap();

        world.clock.advance(Duration::from_millis(150));
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;

        assert!(!world.engine.is_pending(&id));
        let report = world.engine.sweep().await;
        assert_eq!(report.timed_out, 0);

        let timeouts: Vec<_> = events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::ExchangeTimedOut {
                    correlation_id,
                    requester,
                    error,
                } => Some((correlation_id, requester, error)),
                _ => None,
            })
            .collect();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].0, id);
        assert_eq!(timeouts[0].1, *world.focus.identity());
        assert_eq!(timeouts[0].2.code, ErrorCode::Timeout);

        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(stream.next_chunk().await.is_none());

        // The late terminal reply is a warning, not a second retirement
        let late = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"late"))
            .await
            .unwrap();
        assert_eq!(late.warnings[0].kind, WarningKind::DuplicateTerminal);
    }

    #[tokio::test]
    async fn test_sweep_retires_expired_exchange() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::topics(vec![EventTopic::Correlation]));
        let invoke = world.invoke(TimeDelta::milliseconds(100));
        let id = world.engine.process(invoke).await.unwrap().correlation_id;

        world.clock.advance(Duration::from_secs(1));
        let report = world.engine.sweep().await;

        let timeouts = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::ExchangeTimedOut { .. }))
            .count();
        assert_eq!(timeouts, 1);
        assert_eq!(report.timed_out, 1);
        assert!(!world.engine.is_pending(&id));
    }

    #[tokio::test]
    async fn test_traffic_alone_evicts_settled_state() {
        let config = EngineConfig {
            tombstone_ttl: Duration::from_secs(1),
            housekeeping_interval: Duration::from_secs(60),
            ..EngineConfig::default()
        };
        let world = World::with_config(config);
        let id = world
            .engine
            .process(world.invoke(TimeDelta::seconds(30)))
            .await
            .unwrap()
            .correlation_id;
        world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"done"))
            .await
            .unwrap();

        // Tombstone has expired but housekeeping is not yet due
        world.clock.advance(Duration::from_secs(5));
        let early = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"again"))
            .await
            .unwrap();
        assert!(matches!(early.disposition, Disposition::DuplicateTerminal));

        world.clock.advance(Duration::from_secs(60));
        let late = world
            .engine
            .process(world.response(&id, ErrorCode::Ok, true, b"again"))
            .await
            .unwrap();
        assert!(matches!(late.disposition, Disposition::Orphaned));
        assert!(world.engine.take_stream(&id).is_none());
    }

    // =========================================================================
    // ERRORS, CANCELLATION, ORPHANS
    // =========================================================================

    #[tokio::test]
    async fn test_worker_error_ends_stream_with_error() {
        let world = World::new();
        let id = world
            .engine
            .process(world.invoke(TimeDelta::seconds(5)))
            .await
            .unwrap()
            .correlation_id;
        let mut stream = world.engine.take_stream(&id).unwrap();

        world
            .engine
            .process(world.response(&id, ErrorCode::Ok, false, b"partial"))
            .await
            .unwrap();
        let outcome = world
            .engine
            .process(world.error(&id, ErrorCode::DependencyFailed, "database down"))
            .await
            .unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::ErrorMatched {
                code: ErrorCode::DependencyFailed
            }
        ));

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().data, b"partial");
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::DependencyFailed);
        assert_eq!(err.message, "database down");
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_exchange_never_times_out() {
        let world = World::new();
        let mut events = world.subscribe(EventFilter::all());
        let id = world
            .engine
            .process(world.invoke(TimeDelta::milliseconds(50)))
            .await
            .unwrap()
            .correlation_id;

        world.engine.cancel(&id).await.unwrap();
        assert_eq!(
            world.engine.cancel(&id).await.unwrap_err().code,
            ErrorCode::NotFound
        );

        world.clock.advance(Duration::from_secs(1));
        assert_eq!(world.engine.sweep().await.timed_out, 0);

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
    async fn test_orphaned_reply_is_a_warning() {
        let world = World::new();
        let mut anomalies = world.subscribe(EventFilter::topics(vec![EventTopic::Anomaly]));

        let outcome = world
            .engine
            .process(world.response("never-sent", ErrorCode::Ok, true, b"?"))
            .await
            .unwrap();
        assert!(matches!(outcome.disposition, Disposition::Orphaned));
        assert_eq!(outcome.warnings[0].kind, WarningKind::Orphaned);
        assert_eq!(outcome.warnings[0].code, ErrorCode::NotFound);
        assert!(matches!(
            anomalies.try_recv().unwrap(),
            Some(EngineEvent::OrphanedReply { .. })
        ));
    }

    // =========================================================================
    // DISPATCH FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_dispatch_failures_carry_recoverability() {
        let world = World::new();

        world.directory.set_health(WORKER, None, AgentHealth::Busy);
        let busy = world
            .engine
            .process(world.invoke(TimeDelta::seconds(5)))
            .await
            .unwrap_err();
        assert_eq!(busy.code, ErrorCode::AgentBusy);
        assert_eq!(busy.reply.recoverable, Some(true));

        world.directory.set_health(
            WORKER,
            None,
            AgentHealth::Unhealthy {
                reason: "disk full".into(),
            },
        );
        let unhealthy = world
            .engine
            .process(world.invoke(TimeDelta::seconds(5)))
            .await
            .unwrap_err();
        assert_eq!(unhealthy.code, ErrorCode::AgentUnhealthy);

        let body = MessageBody::Invoke(Invoke::new(Target::agent("ghost"), METHOD));
        let unknown = world
            .engine
            .process(world.focus.sign_at(body, world.now()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(unknown.code, ErrorCode::NotFound);
        assert_eq!(unknown.reply.recoverable, Some(false));

        let body = MessageBody::Invoke(
            Invoke::new(Target::agent(WORKER).with_capability("gpu"), METHOD),
        );
        world.directory.set_health(WORKER, None, AgentHealth::Healthy);
        let forbidden = world
            .engine
            .process(world.focus.sign_at(body, world.now()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(forbidden.code, ErrorCode::Forbidden);

        assert_eq!(world.engine.pending_exchanges(), 0);
    }

    #[tokio::test]
    async fn test_past_deadline_rejected_as_timeout() {
        let world = World::new();
        let rejection = world
            .engine
            .process(world.invoke(TimeDelta::seconds(-1)))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Timeout);
    }
}
