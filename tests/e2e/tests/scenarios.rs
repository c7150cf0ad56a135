//! End-to-end scenarios S1-S6.

use chrono::Utc;

use vellum_core::{
    build_view, run_compaction_worker, AgentRole, CancelToken, CompactionConfig, DistillConfig,
    LtmError, MessageKind, SummarizerOp, TurnPart,
};
use vellum_e2e_tests::{Harness, ScriptedSummarizer};

/// S1. Append and token accounting.
#[test]
fn s1_append_and_token_accounting() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "one", 10).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "two", 15).unwrap();
    temporal.append_message(MessageKind::User, "three", 20).unwrap();

    assert_eq!(temporal.estimate_uncompacted_tokens().unwrap(), 45);

    let summary = vellum_core::SummaryRecord {
        id: temporal.generate_summary_id().unwrap(),
        order_num: 1,
        start_id: m1.id.clone(),
        end_id: m2.id.clone(),
        narrative: "covered the first two".into(),
        key_observations: Vec::new(),
        tags: Vec::new(),
        token_estimate: 5,
        created_at: Utc::now(),
    };
    temporal.create_summary(&summary).unwrap();

    assert_eq!(temporal.estimate_uncompacted_tokens().unwrap(), 20);
}

/// S2. CAS.
#[test]
fn s2_cas_update() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let entry = ltm.create("test", None, "T", "B", Vec::new(), "main").unwrap();
    assert_eq!(entry.version, 1);

    let updated = ltm.update("test", "B2", 1, "ltm-consolidate").unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.updated_by, "ltm-consolidate");

    let err = ltm.update("test", "X", 1, AgentRole::Main.as_str()).unwrap_err();
    assert!(matches!(err, LtmError::Conflict { expected: 1, actual: 2 }));
}

/// S3. Reparent with descendants.
#[test]
fn s3_reparent_with_descendants() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let knowledge = ltm.create("knowledge", None, "T", "B", Vec::new(), "main").unwrap();
    let react = ltm
        .create("react", Some("knowledge"), "T", "B", Vec::new(), "main")
        .unwrap();
    ltm.create("hooks", Some("react"), "T", "B", Vec::new(), "main").unwrap();

    let _ = knowledge;
    let moved = ltm.reparent("react", None, react.version, "main").unwrap();
    assert_eq!(moved.path, "/react");

    let hooks = ltm.read("hooks").unwrap().unwrap();
    assert_eq!(hooks.path, "/react/hooks");

    let err = ltm.reparent("react", Some("hooks"), moved.version, "main").unwrap_err();
    assert!(matches!(err, LtmError::CircularParent));
}

/// S4. Archive.
#[test]
fn s4_archive_hides_from_glob() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let v1 = ltm.create("test", None, "T", "B", Vec::new(), "main").unwrap();
    let v2 = ltm.update("test", "B2", v1.version, "ltm-consolidate").unwrap();

    ltm.archive("test", v2.version).unwrap();
    assert!(ltm.read("test").unwrap().is_none());

    let hits = ltm.glob("/**", None).unwrap();
    assert!(!hits.iter().any(|e| e.slug == "test"));
}

/// S5. View interleave: s2 (order 2, subsuming s1) then m4, m5.
#[test]
fn s5_view_interleave_subsumes_lower_order_summary() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "m1", 1).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "m2", 1).unwrap();
    let m3 = temporal.append_message(MessageKind::User, "m3", 1).unwrap();
    let m4 = temporal.append_message(MessageKind::User, "m4", 1).unwrap();
    let m5 = temporal.append_message(MessageKind::User, "m5", 1).unwrap();

    let s1 = vellum_core::SummaryRecord {
        id: temporal.generate_summary_id().unwrap(),
        order_num: 1,
        start_id: m1.id.clone(),
        end_id: m2.id.clone(),
        narrative: "s1".into(),
        key_observations: Vec::new(),
        tags: Vec::new(),
        token_estimate: 1,
        created_at: Utc::now(),
    };
    temporal.create_summary(&s1).unwrap();

    let s2 = vellum_core::SummaryRecord {
        id: temporal.generate_summary_id().unwrap(),
        order_num: 2,
        start_id: m1.id.clone(),
        end_id: m3.id.clone(),
        narrative: "s2".into(),
        key_observations: Vec::new(),
        tags: Vec::new(),
        token_estimate: 1,
        created_at: Utc::now(),
    };
    temporal.create_summary(&s2).unwrap();

    let messages = temporal.get_messages(None, None).unwrap();
    let summaries = temporal.get_summaries(None).unwrap();
    let view = build_view(&messages, &summaries, 1_000_000);

    // s2 then m4, m5: three turns total.
    assert_eq!(view.turns.len(), 3);
    let first_text = match &view.turns[0].parts[0] {
        TurnPart::Text { body } => body.clone(),
        _ => panic!("expected text"),
    };
    assert!(first_text.contains("s2"));
    assert!(!first_text.contains("s1"));

    let fourth = match &view.turns[1].parts[0] {
        TurnPart::Text { body } => body.clone(),
        _ => panic!("expected text"),
    };
    assert!(fourth.contains(&format!("id:{}", m4.id)));
    let fifth = match &view.turns[2].parts[0] {
        TurnPart::Text { body } => body.clone(),
        _ => panic!("expected text"),
    };
    assert!(fifth.contains(&format!("id:{}", m5.id)));
}

/// S6. Distillation boundary adjustment on both edges, driven through the
/// public worker API rather than the private `adjust_boundaries` helper.
#[tokio::test]
async fn s6_distillation_adjusts_boundaries_on_both_edges() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;
    let background = &substrate.background;

    let call1 = temporal.append_message(MessageKind::ToolCall, "{}", 1).unwrap();
    let result1 = temporal.append_message(MessageKind::ToolResult, "{}", 1).unwrap();
    let call2 = temporal.append_message(MessageKind::ToolCall, "{}", 1).unwrap();
    let result2 = temporal.append_message(MessageKind::ToolResult, "{}", 1).unwrap();

    let summarizer = ScriptedSummarizer::new(vec![
        SummarizerOp::CreateDistillation {
            start_id: result1.id.to_string(),
            end_id: call2.id.to_string(),
            operational_context: "a tool round-trip".into(),
            retained_facts: Vec::new(),
        },
        SummarizerOp::FinishDistillation {
            summary: "done".into(),
        },
    ]);

    let mut compaction_cfg = CompactionConfig::default();
    compaction_cfg.threshold = 1;
    compaction_cfg.target = 0;
    let distill_cfg = DistillConfig {
        recency_buffer: 0,
        ..Default::default()
    };
    let cancel = CancelToken::new();

    run_compaction_worker(
        temporal,
        background,
        &summarizer,
        None,
        &distill_cfg,
        &compaction_cfg,
        &cancel,
    )
    .await
    .unwrap();

    let summaries = temporal.get_summaries(None).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].start_id, call1.id);
    assert_eq!(summaries[0].end_id, result2.id);
}
