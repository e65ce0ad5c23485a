use super::*;

#[test]
fn decodes_engine_open_packet() {
    let packet = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
        .expect("open");
    assert_eq!(
        packet,
        Packet::Open(OpenInfo {
            sid: "abc".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
        })
    );
}

#[test]
fn decodes_heartbeat_and_control_packets() {
    assert_eq!(decode("2").expect("ping"), Packet::Ping);
    assert_eq!(decode("3").expect("pong"), Packet::Pong);
    assert_eq!(decode("1").expect("close"), Packet::Close);
    assert_eq!(decode("6").expect("noop"), Packet::Noop);
    assert_eq!(decode("41").expect("disconnect"), Packet::Disconnect);
}

#[test]
fn decodes_connect_acknowledgement_with_and_without_payload() {
    assert_eq!(decode("40").expect("connect"), Packet::Connect(None));
    assert_eq!(
        decode(r#"40{"sid":"xyz"}"#).expect("connect"),
        Packet::Connect(Some(json!({"sid": "xyz"})))
    );
}

#[test]
fn decodes_connect_error_reason() {
    let packet =
        decode(r#"44{"message":"Authentication error: Invalid token."}"#).expect("connect error");
    assert_eq!(
        packet,
        Packet::ConnectError(json!({"message": "Authentication error: Invalid token."}))
    );
}

#[test]
fn decodes_event_with_payload() {
    let packet = decode(r#"42["status:user-online",{"userId":3}]"#).expect("event");
    assert_eq!(
        packet,
        Packet::Event {
            name: "status:user-online".to_string(),
            data: json!({"userId": 3}),
        }
    );
}

#[test]
fn event_without_payload_carries_null() {
    let packet = decode(r#"42["ping-me"]"#).expect("event");
    assert_eq!(
        packet,
        Packet::Event {
            name: "ping-me".to_string(),
            data: Value::Null,
        }
    );
}

#[test]
fn skips_namespace_and_ack_id() {
    let packet = decode(r#"42/chat,17["typing",{"senderId":4}]"#).expect("event");
    assert_eq!(
        packet,
        Packet::Event {
            name: "typing".to_string(),
            data: json!({"senderId": 4}),
        }
    );
}

#[test]
fn rejects_malformed_and_unsupported_frames() {
    assert_eq!(decode(""), Err(CodecError::Empty));
    assert_eq!(decode("4"), Err(CodecError::Empty));
    assert_eq!(decode("9"), Err(CodecError::UnknownEnginePacket('9')));
    assert_eq!(decode("49"), Err(CodecError::UnknownSocketPacket('9')));
    assert_eq!(decode("5"), Err(CodecError::Unsupported('5')));
    assert_eq!(
        decode(r#"45-["bin",{"_placeholder":true,"num":0}]"#),
        Err(CodecError::Unsupported('5'))
    );
    assert!(matches!(decode("42[1,2]"), Err(CodecError::Payload(_))));
    assert!(matches!(decode("42not-json"), Err(CodecError::Payload(_))));
}

#[test]
fn encodes_client_packets() {
    assert_eq!(
        Packet::Connect(Some(json!({"token": "t0k"}))).encode(),
        r#"40{"token":"t0k"}"#
    );
    assert_eq!(Packet::Disconnect.encode(), "41");
    assert_eq!(Packet::Pong.encode(), "3");
    assert_eq!(
        Packet::Event {
            name: "message:send".to_string(),
            data: json!({"recipientId": 42, "content": "hi"}),
        }
        .encode(),
        r#"42["message:send",{"content":"hi","recipientId":42}]"#
    );
}

#[test]
fn encoded_event_decodes_back() {
    let packet = Packet::Event {
        name: "file:send".to_string(),
        data: json!({"recipientId": 1, "fileUrl": "/uploads/a"}),
    };
    assert_eq!(decode(&packet.encode()).expect("decode"), packet);
}
