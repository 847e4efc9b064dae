//! Protocol layer tests: envelope serialization, codec errors, control literals.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wsrpc_protocol::control::{self, FrameKind};
    use wsrpc_protocol::*;

    // ─────────────────────────────────────────────────────────────────────
    // EnvelopeType
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn envelope_type_serializes_lowercase() {
        assert_eq!(serde_json::to_value(EnvelopeType::Call).unwrap(), json!("call"));
        assert_eq!(serde_json::to_value(EnvelopeType::Result).unwrap(), json!("result"));
        assert_eq!(serde_json::to_value(EnvelopeType::Notify).unwrap(), json!("notify"));
    }

    #[test]
    fn envelope_type_rejects_unknown() {
        let parsed: Result<EnvelopeType, _> = serde_json::from_value(json!("Call"));
        assert!(parsed.is_err());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Envelope codec
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn decode_inverts_encode() {
        let envelopes = [
            Envelope::call(1, "eval", json!("3+4")),
            Envelope::call(u64::MAX, "render", json!({"rows": [1, 2, {"nested": null}], "ok": true})),
            Envelope::result(42, json!([1.5, "two", false])),
            Envelope::notify("show", json!("3 + 4 = 7")),
            Envelope::notify("clear", serde_json::Value::Null),
        ];
        for env in envelopes {
            let text = env.encode().unwrap();
            let back = Envelope::decode(text.as_bytes()).unwrap();
            assert_eq!(back, env);
        }
    }

    #[test]
    fn encode_uses_typ_field() {
        let text = Envelope::notify("show", json!("x")).encode().unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["typ"], "notify");
        assert_eq!(v["id"], 0);
        assert!(v.get("type").is_none());
    }

    #[test]
    fn decode_exact_browser_result() {
        // What the browser script sends back for `eval("3+4")`
        let wire = r#"{"id":17,"typ":"result","data":7}"#;
        let env = Envelope::decode(wire.as_bytes()).unwrap();
        assert_eq!(env, Envelope::result(17, json!(7)));
    }

    #[test]
    fn decode_result_without_data_is_null() {
        let env = Envelope::decode(br#"{"typ":"result","id":5}"#).unwrap();
        assert_eq!(env.data, serde_json::Value::Null);
    }

    #[test]
    fn decode_missing_typ_is_malformed() {
        let err = Envelope::decode(br#"{"id":5,"data":1}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
        assert!(err.to_string().starts_with("malformed envelope"));
    }

    #[test]
    fn decode_negative_id_is_malformed() {
        assert!(Envelope::decode(br#"{"typ":"result","id":-1,"data":1}"#).is_err());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control literals
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn control_literals_match_browser_script() {
        assert_eq!(control::HANDSHAKE, "myws,connected!");
        assert_eq!(control::PING_PONG, "ping-pong");
        assert_eq!(control::SESSION_COOKIE, "websocketid");
        assert_eq!(control::DEFAULT_WS_PATH, "/_myws/_conn/");
    }

    #[test]
    fn json_frames_classify_as_envelopes() {
        let text = Envelope::result(1, json!("ping-pong")).encode().unwrap();
        assert_eq!(FrameKind::classify(text.as_bytes()), FrameKind::Envelope);
    }
}
