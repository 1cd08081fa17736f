// Integration tests for response aggregation
//
// These tests feed classified wire messages into the aggregator in
// different orders and check that each reply is emitted exactly once.

use anyhow::Result;
use loqa_avatar::aggregator::{AggregatorConfig, ResponseAggregator};
use loqa_avatar::protocol::{classify, Inbound, ResponsePart};
use serde_json::json;
use std::time::Duration;

fn part(value: serde_json::Value) -> ResponsePart {
    match classify(value.to_string().as_bytes()) {
        Inbound::Part(part) => part,
        other => panic!("expected a correlated part, got {:?}", other),
    }
}

fn audio(id: &str) -> ResponsePart {
    part(json!({
        "message_id": id,
        "audio_url": format!("/audio/{}.wav", id),
        "visemas": [{"tiempo": 0.1, "visema": "aa"}, {"tiempo": 0.3, "visema": "ou"}]
    }))
}

fn expressions(id: &str) -> ResponsePart {
    part(json!({
        "message_id": id,
        "expresiones": [{"expresion": "happy", "tiempo": 0.0, "intensidad": 0.6}]
    }))
}

fn animation(id: &str) -> ResponsePart {
    part(json!({
        "message_id": id,
        "sequence": "wave",
        "vrma_file": "/animations/idle2.vrma",
        "breathing": false,
        "delay": 0.2
    }))
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn test_audio_then_expressions_emits_once_on_audio() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    let bundle = agg.ingest(audio("1"), ms(0))?.expect("audio completes the bundle");
    assert_eq!(bundle.correlation_id, "1");
    assert!(bundle.expressions.is_none());

    // Expressions after emission are late and dropped
    assert!(agg.ingest(expressions("1"), ms(10))?.is_none());
    assert_eq!(agg.stats().completed, 1);
    assert_eq!(agg.stats().late_parts_dropped, 1);
    assert!(agg.pending_ids().is_empty());

    Ok(())
}

#[test]
fn test_enrichment_before_audio_is_carried_in_bundle() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    assert!(agg.ingest(expressions("1"), ms(0))?.is_none());
    assert!(agg.ingest(animation("1"), ms(5))?.is_none());
    assert_eq!(agg.pending_ids(), vec!["1".to_string()]);

    let bundle = agg.ingest(audio("1"), ms(40))?.expect("complete");
    assert!(bundle.expressions.is_some());
    assert!(bundle.animation.is_some());
    assert_eq!(bundle.completion_latency, ms(40));

    Ok(())
}

#[test]
fn test_exactly_once_for_every_arrival_order() -> Result<()> {
    let orders: [[u8; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let mut agg = ResponseAggregator::new(AggregatorConfig::default());
        let mut emitted = 0;
        for (step, which) in order.iter().enumerate() {
            let p = match which {
                0 => audio("7"),
                1 => expressions("7"),
                _ => animation("7"),
            };
            if agg.ingest(p, ms(step as u64 * 10))?.is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1, "order {:?}", order);
        assert_eq!(agg.stats().completed, 1);
    }

    Ok(())
}

#[test]
fn test_expressions_only_bundle_is_evicted_without_emission() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    assert!(agg.ingest(expressions("2"), ms(0))?.is_none());

    // Not yet stale
    assert!(agg.sweep(ms(29_000), ms(30_000)).is_empty());
    assert!(agg.poll_ready(ms(29_000)).is_empty());

    let evicted = agg.sweep(ms(31_000), ms(30_000));
    assert_eq!(evicted, vec!["2".to_string()]);
    assert_eq!(agg.stats().evicted, 1);
    assert_eq!(agg.stats().completed, 0);
    assert!(agg.pending_status("2", ms(31_000)).is_none());

    Ok(())
}

#[test]
fn test_independent_ids_do_not_interfere() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    agg.ingest(expressions("a"), ms(0))?;
    let b = agg.ingest(audio("b"), ms(5))?.expect("b completes");
    assert_eq!(b.correlation_id, "b");

    let status = agg.pending_status("a", ms(20)).expect("a still pending");
    assert!(status.has_expressions);
    assert!(!status.has_audio);
    assert!(!status.is_complete);
    assert_eq!(status.age_ms, 20);

    Ok(())
}

#[test]
fn test_numeric_message_id_is_normalised() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    agg.ingest(
        part(json!({"message_id": 42, "expresiones": []})),
        ms(0),
    )?;
    let bundle = agg
        .ingest(
            part(json!({"message_id": "42", "audio_url": "/audio/42.wav"})),
            ms(1),
        )?
        .expect("complete");
    assert_eq!(bundle.correlation_id, "42");
    assert!(bundle.audio.visemas.is_empty());
    assert!(bundle.expressions.is_some());

    Ok(())
}

#[test]
fn test_grace_window_waits_for_enrichment() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig {
        enrichment_grace_ms: 200,
        ..Default::default()
    });

    assert!(agg.ingest(audio("3"), ms(0))?.is_none());
    assert!(agg.poll_ready(ms(100)).is_empty());

    // Enrichment arriving inside the window is included
    assert!(agg.ingest(expressions("3"), ms(150))?.is_none());
    let bundle = agg.ingest(animation("3"), ms(160))?.expect("fully enriched");
    assert!(bundle.expressions.is_some() && bundle.animation.is_some());

    // Audio-only bundle is released once the window runs out
    assert!(agg.ingest(audio("4"), ms(1_000))?.is_none());
    let ready = agg.poll_ready(ms(1_200));
    assert_eq!(ready.len(), 1);
    assert!(ready[0].expressions.is_none());
    assert!(agg.poll_ready(ms(1_300)).is_empty());

    Ok(())
}

#[test]
fn test_average_completion_tracks_latencies() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    agg.ingest(expressions("x"), ms(0))?;
    agg.ingest(audio("x"), ms(100))?;
    agg.ingest(expressions("y"), ms(0))?;
    agg.ingest(audio("y"), ms(300))?;

    assert!((agg.stats().average_completion_ms - 200.0).abs() < 1e-9);
    assert!(agg.stats().last_completed_at.is_some());

    agg.reset();
    assert_eq!(agg.stats().completed, 0);

    Ok(())
}

#[test]
fn test_repeated_part_replaces_previous_payload() -> Result<()> {
    let mut agg = ResponseAggregator::new(AggregatorConfig::default());

    agg.ingest(expressions("1"), ms(0))?;
    let second = part(json!({
        "message_id": "1",
        "expresiones": [
            {"expresion": "sad", "tiempo": 0.5},
            {"expresion": "surprised", "tiempo": 1.0, "intensidad": 0.3}
        ]
    }));
    agg.ingest(second, ms(5))?;

    let bundle = agg.ingest(audio("1"), ms(10))?.expect("complete");
    let channels: Vec<&str> = bundle
        .expressions
        .as_ref()
        .map(|set| set.expresiones.iter().map(|e| e.channel.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(channels, vec!["sad", "surprised"]);
    assert_eq!(agg.stats().completed, 1);

    Ok(())
}

#[test]
fn test_audio_complete_bundle_survives_sweep_during_grace() -> Result<()> {
    let config = AggregatorConfig {
        enrichment_grace_ms: 500,
        ..Default::default()
    };
    let max_age = config.max_age();
    let mut agg = ResponseAggregator::new(config);

    agg.ingest(expressions("g"), ms(0))?;
    assert!(agg.ingest(audio("g"), ms(29_900))?.is_none());

    assert!(agg.poll_ready(ms(30_100)).is_empty());
    assert!(agg.sweep(ms(30_100), max_age).is_empty());

    let ready = agg.poll_ready(ms(30_400));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].correlation_id, "g");
    assert_eq!(agg.stats().completed, 1);
    assert_eq!(agg.stats().evicted, 0);

    Ok(())
}

#[test]
fn test_repeated_audio_does_not_restart_grace() -> Result<()> {
    let config = AggregatorConfig {
        enrichment_grace_ms: 500,
        ..Default::default()
    };
    let mut agg = ResponseAggregator::new(config);

    agg.ingest(audio("1"), ms(0))?;
    let replacement = part(json!({
        "message_id": "1",
        "audio_url": "/audio/retry.wav",
        "visemas": []
    }));
    assert!(agg.ingest(replacement, ms(400))?.is_none());

    let ready = agg.poll_ready(ms(500));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].audio.audio_url, "/audio/retry.wav");

    Ok(())
}
