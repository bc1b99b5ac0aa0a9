//! # Authentication Attack Scenarios
//!
//! Attacks a hostile peer can mount against the engine's front door:
//!
//! - **Tampering**: body, nonce or issuedAt altered after signing
//! - **Replay**: a captured envelope resent, alone or interleaved
//! - **Stale / future signatures**: issuedAt outside the freshness window
//! - **Impersonation**: unknown sender, revoked key, wrong algorithm
//!
//! Every rejection must leave the replay guard untouched so the legitimate
//! sender can still use the nonce.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeDelta;
    use pap_crypto::EnvelopeSigner;
    use pap_engine::{EngineConfig, EnvelopeProcessingApi};
    use pap_types::{
        AgentIdentity, Envelope, ErrorCode, Invoke, MessageBody, SignatureAlgorithm, Target,
    };
    use proptest::prelude::*;

    use crate::integration::fixtures::{World, METHOD, WORKER};

    fn invoke_body() -> MessageBody {
        MessageBody::Invoke(
            Invoke::new(Target::agent(WORKER), METHOD).with_expect_reply(false),
        )
    }

    /// `signer` signs the fire-and-forget invoke with an explicit nonce.
    fn signed_with_nonce(world: &World, signer: &EnvelopeSigner, nonce: &str) -> Envelope {
        let body = invoke_body();
        let auth = signer.auth_for(&body, nonce, world.now()).unwrap();
        Envelope::new(signer.identity().clone(), auth, body)
    }

    // =========================================================================
    // TAMPERING
    // =========================================================================

    #[tokio::test]
    async fn test_body_tampering_rejected_as_bad_request() {
        let world = World::new();
        let mut env = world.focus.sign_at(invoke_body(), world.now()).unwrap();
        if let MessageBody::Invoke(invoke) = &mut env.body {
            invoke.method = "exfiltrate".into();
        }

        let rejection = world.engine.process(env).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::BadRequest);
        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    #[tokio::test]
    async fn test_auth_field_tampering_rejected_as_unauthorized() {
        let world = World::new();

        let mut nonce_swapped = world.focus.sign_at(invoke_body(), world.now()).unwrap();
        nonce_swapped.auth.nonce.push('x');
        let rejection = world.engine.process(nonce_swapped).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Unauthorized);

        let mut time_shifted = world.focus.sign_at(invoke_body(), world.now()).unwrap();
        time_shifted.auth.issued_at -= TimeDelta::seconds(1);
        let rejection = world.engine.process(time_shifted).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Unauthorized);

        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    #[tokio::test]
    async fn test_sub_millisecond_issued_at_shift_rejected() {
        let world = World::new();

        let mut micro = signed_with_nonce(&world, &world.focus, "n-micro");
        micro.auth.issued_at += TimeDelta::microseconds(1);
        let rejection = world.engine.process(micro).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Unauthorized);

        let mut nano = signed_with_nonce(&world, &world.focus, "n-nano");
        nano.auth.issued_at -= TimeDelta::nanoseconds(1);
        let rejection = world.engine.process(nano).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Unauthorized);

        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    #[tokio::test]
    async fn test_sender_spoofing_rejected() {
        let world = World::new();
        // Signed by focus, claims to be the supervisor
        let mut env = world.focus.sign_at(invoke_body(), world.now()).unwrap();
        env.sender = world.supervisor.identity().clone();

        let rejection = world.engine.process(env).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Unauthorized);
        assert!(!rejection.is_recoverable());
    }

    // =========================================================================
    // REPLAY
    // =========================================================================

    #[tokio::test]
    async fn test_replay_rejected_as_conflict() {
        let world = World::new();
        let env = signed_with_nonce(&world, &world.focus, "n-1");

        world.engine.process(env.clone()).await.unwrap();
        let rejection = world.engine.process(env).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Conflict);
        assert_eq!(world.engine.remembered_nonces(), 1);
    }

    #[tokio::test]
    async fn test_same_nonce_from_other_senders_interleaved() {
        let world = World::new();

        let first = signed_with_nonce(&world, &world.focus, "shared");
        let other = signed_with_nonce(&world, &world.supervisor, "shared");
        let replayed = signed_with_nonce(&world, &world.focus, "shared");

        world.engine.process(first).await.unwrap();
        world.engine.process(other).await.unwrap();
        let rejection = world.engine.process(replayed).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Conflict);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replays_admit_exactly_one() {
        let world = Arc::new(World::new());
        let env = signed_with_nonce(&world, &world.focus, "race");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let world = Arc::clone(&world);
            let env = env.clone();
            tasks.push(tokio::spawn(
                async move { world.engine.process(env).await },
            ));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(rejection) => assert_eq!(rejection.code, ErrorCode::Conflict),
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_failed_verification_does_not_burn_nonce() {
        let world = World::new();

        let mut forged = signed_with_nonce(&world, &world.focus, "n-keep");
        forged.auth.signature[0] ^= 0xff;
        assert_eq!(
            world.engine.process(forged).await.unwrap_err().code,
            ErrorCode::Unauthorized
        );

        let mut exotic = signed_with_nonce(&world, &world.focus, "n-keep");
        exotic.auth.algorithm = SignatureAlgorithm::Other("rsa-pss".into());
        assert_eq!(
            world.engine.process(exotic).await.unwrap_err().code,
            ErrorCode::VersionUnsupported
        );

        let genuine = signed_with_nonce(&world, &world.focus, "n-keep");
        world.engine.process(genuine).await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_at_exact_window_edge_rejected() {
        let world = World::new();
        let env = signed_with_nonce(&world, &world.focus, "n-edge");
        let issued = env.auth.issued_at;

        world.engine.process(env.clone()).await.unwrap();

        // Oldest instant still inside the freshness window
        let window = TimeDelta::from_std(world.engine.config().replay_window).unwrap();
        world.clock.set(issued + window);
        assert_eq!(world.engine.sweep().await.replay_purged, 0);

        let rejection = world.engine.process(env).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_replay_memory_bounded_by_window() {
        let world = World::new();
        for i in 0..5 {
            let env = signed_with_nonce(&world, &world.focus, &format!("n-{i}"));
            world.engine.process(env).await.unwrap();
        }
        assert_eq!(world.engine.remembered_nonces(), 5);

        let window = world.engine.config().replay_window;
        world.clock.advance(window + Duration::from_secs(1));
        let report = world.engine.sweep().await;
        assert_eq!(report.replay_purged, 5);
        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    // =========================================================================
    // FRESHNESS
    // =========================================================================

    #[tokio::test]
    async fn test_freshness_window_edges() {
        let config = EngineConfig {
            max_clock_skew: Duration::from_secs(60),
            replay_window: Duration::from_secs(60),
            ..EngineConfig::default()
        };
        let world = World::with_config(config);
        let sign_at = |offset: TimeDelta| {
            world
                .focus
                .sign_at(invoke_body(), world.now() + offset)
                .unwrap()
        };

        let stale = world
            .engine
            .process(sign_at(TimeDelta::seconds(-61)))
            .await
            .unwrap_err();
        assert_eq!(stale.code, ErrorCode::Timeout);

        let future = world
            .engine
            .process(sign_at(TimeDelta::seconds(61)))
            .await
            .unwrap_err();
        assert_eq!(future.code, ErrorCode::BadRequest);

        world.engine.process(sign_at(TimeDelta::seconds(-60))).await.unwrap();
        world.engine.process(sign_at(TimeDelta::seconds(60))).await.unwrap();
        assert_eq!(world.engine.remembered_nonces(), 2);
    }

    // =========================================================================
    // IMPERSONATION
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_and_revoked_senders_rejected() {
        let world = World::new();

        let stranger = EnvelopeSigner::ed25519(AgentIdentity::new("mallory", "cluster-z"));
        let env = stranger.sign_at(invoke_body(), world.now()).unwrap();
        assert_eq!(
            world.engine.process(env).await.unwrap_err().code,
            ErrorCode::Unauthorized
        );

        world.keys.revoke(world.focus.identity());
        let env = world.focus.sign_at(invoke_body(), world.now()).unwrap();
        assert_eq!(
            world.engine.process(env).await.unwrap_err().code,
            ErrorCode::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_algorithm_mismatch_with_registered_key() {
        let world = World::new();
        // worker-1 is registered with a P-256 key
        let mut env = world.worker.sign_at(invoke_body(), world.now()).unwrap();
        env.auth.algorithm = SignatureAlgorithm::Ed25519;
        assert_eq!(
            world.engine.process(env).await.unwrap_err().code,
            ErrorCode::Unauthorized
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_any_method_swap_is_detected(method in "[a-z]{1,12}") {
            prop_assume!(method != METHOD);
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let code = runtime.block_on(async {
                let world = World::new();
                let mut env = world.focus.sign_at(invoke_body(), world.now()).unwrap();
                if let MessageBody::Invoke(invoke) = &mut env.body {
                    invoke.method = method.clone();
                }
                world.engine.process(env).await.unwrap_err().code
            });
            prop_assert_eq!(code, ErrorCode::BadRequest);
        }
    }
}
