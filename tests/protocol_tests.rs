use loqa_avatar::nats::utterance;
use loqa_avatar::protocol::{
    classify, AnimationSequence, ClientMessage, FastPreview, Inbound, PartKind, ResponsePart,
};

#[test]
fn test_fast_preview_shapes() {
    let text_only = classify(br#"{"text": "hi"}"#);
    assert_eq!(
        text_only,
        Inbound::FastPreview(FastPreview {
            text: Some("hi".to_string()),
            ..Default::default()
        })
    );

    let with_audio = classify(
        br#"{"audio_url": "/audio/p.wav", "visemas": [{"tiempo": 0.2, "visema": "aa"}]}"#,
    );
    match with_audio {
        Inbound::FastPreview(p) => {
            assert_eq!(p.audio_url.as_deref(), Some("/audio/p.wav"));
            assert_eq!(p.visemas.map(|v| v.len()), Some(1));
            assert!(p.text.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_null_message_id_counts_as_missing() {
    let inbound = classify(br#"{"message_id": null, "text": "hi"}"#);
    assert!(matches!(inbound, Inbound::FastPreview(_)));
}

#[test]
fn test_correlated_parts_are_classified_structurally() {
    let audio = classify(br#"{"message_id": "1", "audio_url": "/a.wav", "visemas": []}"#);
    let expressions = classify(
        br#"{"message_id": "1", "expresiones": [{"expresion": "sad", "tiempo": 1.5}]}"#,
    );
    let animation = classify(
        br#"{
            "message_id": "1",
            "sequence": "greeting",
            "description": "wave at the user",
            "keyframes": [{"vrma": "/animations/hello.vrma", "duration": 2.0, "crossfade": 0.4}],
            "breathing": true,
            "delay": 0.5,
            "temporary": true
        }"#,
    );

    let kinds: Vec<PartKind> = [audio, expressions, animation]
        .into_iter()
        .map(|inbound| match inbound {
            Inbound::Part(part) => {
                assert_eq!(part.correlation_id(), "1");
                part.kind()
            }
            other => panic!("unexpected {:?}", other),
        })
        .collect();

    assert_eq!(
        kinds,
        vec![
            PartKind::AudioVisemes,
            PartKind::Expressions,
            PartKind::AnimationDirective
        ]
    );
}

#[test]
fn test_expression_intensity_is_optional() {
    let inbound = classify(
        br#"{"message_id": "e", "expresiones": [
            {"expresion": "happy", "tiempo": 0.0, "intensidad": 0.4},
            {"expresion": "sad", "tiempo": 1.0}
        ]}"#,
    );
    match inbound {
        Inbound::Part(ResponsePart::Expressions(set)) => {
            assert_eq!(set.expresiones[0].intensity, Some(0.4));
            assert_eq!(set.expresiones[1].intensity, None);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_animation_clip_name_resolution() {
    let from_keyframe: AnimationSequence = serde_json::from_str(
        r#"{"sequence": "s", "keyframes": [{"vrma": "/animations/fix_hair.vrma", "duration": 1.0, "crossfade": 0.3}]}"#,
    )
    .unwrap();
    assert_eq!(from_keyframe.clip_name().as_deref(), Some("fix_hair"));
    assert_eq!(from_keyframe.crossfade(), Some(0.3));
    assert!(!from_keyframe.breathing);
    assert_eq!(from_keyframe.delay, 0.0);

    let from_file: AnimationSequence =
        serde_json::from_str(r#"{"sequence": "s", "vrma_file": "idle2.vrma"}"#).unwrap();
    assert_eq!(from_file.clip_name().as_deref(), Some("idle2"));
    assert_eq!(from_file.crossfade(), None);

    let empty: AnimationSequence =
        serde_json::from_str(r#"{"sequence": "s", "keyframes": []}"#).unwrap();
    assert_eq!(empty.clip_name(), None);
}

#[test]
fn test_server_error_requires_error_type() {
    match classify(br#"{"error": "rate limited", "type": "error"}"#) {
        Inbound::ServerError(e) => {
            assert_eq!(e.error, "rate limited");
            assert_eq!(e.kind, "error");
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        classify(br#"{"error": "x", "type": "warning"}"#),
        Inbound::Unclassified(_)
    ));
}

#[test]
fn test_unknown_correlated_shape_is_unclassified() {
    assert!(matches!(
        classify(br#"{"message_id": "1", "mood": "sleepy"}"#),
        Inbound::Unclassified(_)
    ));
}

#[test]
fn test_utterance_serialization() {
    let msg = utterance("hola", Some("abc".to_string()));
    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(json, r#"{"message":"hola","id":"abc"}"#);

    let generated = utterance("hola", None);
    assert_eq!(generated.id.len(), 36);

    let back: ClientMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back, msg);
}
