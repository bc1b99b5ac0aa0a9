//! # Wire Form Through the Engine
//!
//! Raw bytes in, `Outcome` or `Rejection` out, the way a transport drives
//! the engine.

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pap_engine::{Disposition, EnvelopeProcessingApi};
    use pap_types::{
        encode_envelope, AlertEvent, AlertSeverity, ErrorCode, Event, EventDetail, EventType,
        MessageBody,
    };
    use serde_json::{json, Value};

    use crate::integration::fixtures::World;

    fn to_value(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_encoded_invoke_accepted_from_bytes() {
        let world = World::new();
        let env = world
            .invoke(TimeDelta::seconds(5))
            .with_trace("4bf92f3577b34da6a3ce929d0e0e4736", "00f067aa0ba902b7")
            .with_annotation("tenant", "acme");
        let bytes = encode_envelope(&env).unwrap();

        let outcome = world.engine.process_wire(&bytes).await.unwrap();
        assert_eq!(outcome.message_id, env.message_id);
        assert!(matches!(outcome.disposition, Disposition::Dispatched { .. }));
    }

    #[tokio::test]
    async fn test_wire_field_names_are_camel_case() {
        let world = World::new();
        let bytes = encode_envelope(&world.invoke(TimeDelta::seconds(5))).unwrap();
        let value = to_value(&bytes);

        assert!(value["messageId"].is_string());
        assert!(value["sentAt"].is_string());
        assert!(value["auth"]["payloadHash"].is_string());
        assert!(value["auth"]["issuedAt"].is_string());
        assert_eq!(value["body"]["kind"], "invoke");
        assert_eq!(value["body"]["target"]["agent"], "worker-1");
    }

    #[tokio::test]
    async fn test_fields_from_another_kind_rejected() {
        let world = World::new();
        let bytes = encode_envelope(&world.invoke(TimeDelta::seconds(5))).unwrap();
        let mut value = to_value(&bytes);
        value["body"]["isFinal"] = json!(true);

        let rejection = world
            .engine
            .process_wire(&serde_json::to_vec(&value).unwrap())
            .await
            .unwrap_err();
        assert_eq!(rejection.code, ErrorCode::BadRequest);
        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_and_garbage_rejected() {
        let world = World::new();
        let bytes = encode_envelope(&world.invoke(TimeDelta::seconds(5))).unwrap();
        let mut value = to_value(&bytes);
        value["body"]["kind"] = json!("teleport");

        let unknown = world
            .engine
            .process_wire(&serde_json::to_vec(&value).unwrap())
            .await
            .unwrap_err();
        assert_eq!(unknown.code, ErrorCode::BadRequest);

        let garbage = world.engine.process_wire(b"{not json").await.unwrap_err();
        assert_eq!(garbage.code, ErrorCode::BadRequest);
        assert_eq!(garbage.reply.recoverable, Some(false));
    }

    #[tokio::test]
    async fn test_malformed_trace_id_rejected_before_auth() {
        let world = World::new();
        let env = world
            .invoke(TimeDelta::seconds(5))
            .with_trace("NOT-HEX", "00f067aa0ba902b7");
        let bytes = encode_envelope(&env).unwrap();

        let rejection = world.engine.process_wire(&bytes).await.unwrap_err();
        assert_eq!(rejection.code, ErrorCode::BadRequest);
        assert_eq!(world.engine.remembered_nonces(), 0);
    }

    #[tokio::test]
    async fn test_alert_event_accepted() {
        let world = World::new();
        let event = Event::new(EventDetail::Alert(AlertEvent {
            title: "disk".into(),
            description: "92% used".into(),
            severity: AlertSeverity::Warning,
            labels: None,
        }));
        let env = world
            .worker
            .sign_at(MessageBody::Event(event), world.now())
            .unwrap();
        let bytes = encode_envelope(&env).unwrap();

        let outcome = world.engine.process_wire(&bytes).await.unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::EventAccepted {
                event_type: EventType::Alert
            }
        ));
    }
}
