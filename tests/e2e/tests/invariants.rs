//! Universal invariants and boundary cases.

use chrono::Utc;

use vellum_core::{
    covers, effective_summaries, gaps, subsumed, uncovered_messages, CompactionConfig, LtmError,
    MessageKind, SummaryRecord,
};
use vellum_e2e_tests::Harness;

fn summary(
    temporal: &vellum_core::TemporalLog,
    order_num: i64,
    start_id: vellum_core::Id,
    end_id: vellum_core::Id,
) -> SummaryRecord {
    SummaryRecord {
        id: temporal.generate_summary_id().unwrap(),
        order_num,
        start_id,
        end_id,
        narrative: "narrative".into(),
        key_observations: Vec::new(),
        tags: Vec::new(),
        token_estimate: 1,
        created_at: Utc::now(),
    }
}

/// Invariant: every message is either covered by exactly the effective
/// summaries or appears in `uncovered_messages`, never both.
#[test]
fn every_message_is_covered_xor_uncovered() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "m1", 1).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "m2", 1).unwrap();
    let m3 = temporal.append_message(MessageKind::User, "m3", 1).unwrap();

    let s = summary(temporal, 1, m1.id.clone(), m2.id.clone());
    temporal.create_summary(&s).unwrap();

    let messages = vec![m1.clone(), m2.clone(), m3.clone()];
    let summaries = vec![s];

    for m in &messages {
        let is_covered = covers(&m.id, &summaries);
        let is_uncovered = uncovered_messages(&messages, &summaries).iter().any(|u| u.id == m.id);
        assert_ne!(is_covered, is_uncovered, "message {} violated covered xor uncovered", m.id);
    }
}

/// Invariant: `subsumed` is irreflexive and `effective_summaries` never
/// contains a summary subsumed by another member of the same set.
#[test]
fn effective_summaries_excludes_all_subsumed() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "m1", 1).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "m2", 1).unwrap();
    let m3 = temporal.append_message(MessageKind::User, "m3", 1).unwrap();

    let low = summary(temporal, 1, m1.id.clone(), m2.id.clone());
    let high = summary(temporal, 2, m1.id.clone(), m3.id.clone());
    let summaries = vec![low.clone(), high.clone()];

    assert!(subsumed(&low, &summaries));
    assert!(!subsumed(&high, &summaries));

    let effective = effective_summaries(&summaries);
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].id, high.id);
}

/// Boundary: two summaries with an identical range but equal order never
/// subsume each other, so both survive into `effective_summaries` (the
/// storage layer is responsible for not creating such duplicates in the
/// first place).
#[test]
fn equal_order_equal_range_summaries_do_not_subsume_each_other() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "m1", 1).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "m2", 1).unwrap();

    let a = summary(temporal, 1, m1.id.clone(), m2.id.clone());
    let b = summary(temporal, 1, m1.id.clone(), m2.id.clone());
    let summaries = vec![a.clone(), b.clone()];

    assert!(!subsumed(&a, &summaries));
    assert!(!subsumed(&b, &summaries));
    assert_eq!(effective_summaries(&summaries).len(), 2);
}

/// Boundary: `should_trigger_compaction` is false at exactly threshold and
/// true at threshold + 1 (strictly greater-than).
#[test]
fn compaction_trigger_is_strictly_greater_than_threshold() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    temporal.append_message(MessageKind::User, "x", 10).unwrap();

    let cfg = CompactionConfig {
        threshold: 10 + vellum_core::FIXED_OVERHEAD_TOKENS,
        ..CompactionConfig::default()
    };
    let messages = temporal.get_messages(None, None).unwrap();
    let summaries = temporal.get_summaries(None).unwrap();
    let workers = substrate.background.get_all_workers().unwrap();

    assert!(!vellum_core::should_trigger_compaction(&messages, &summaries, &workers, &cfg));

    let cfg_over = CompactionConfig {
        threshold: cfg.threshold - 1,
        ..cfg
    };
    assert!(vellum_core::should_trigger_compaction(&messages, &summaries, &workers, &cfg_over));
}

/// Boundary: `glob("/foo/*")` matches one segment below `/foo`, `glob("/foo/**")`
/// matches any depth.
#[test]
fn glob_star_vs_double_star_depth_semantics() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    ltm.create("foo", None, "T", "B", Vec::new(), "main").unwrap();
    ltm.create("bar", Some("foo"), "T", "B", Vec::new(), "main").unwrap();
    ltm.create("baz", Some("bar"), "T", "B", Vec::new(), "main").unwrap();

    let one_level = ltm.glob("/foo/*", None).unwrap();
    assert_eq!(one_level.iter().map(|e| e.path.clone()).collect::<Vec<_>>(), vec!["/foo/bar"]);

    let mut any_depth: Vec<_> = ltm.glob("/foo/**", None).unwrap().into_iter().map(|e| e.path).collect();
    any_depth.sort();
    assert_eq!(any_depth, vec!["/foo/bar", "/foo/bar/baz"]);
}

/// Invariant: a CAS conflict never mutates storage — the stored version
/// after a rejected update is unchanged.
#[test]
fn rejected_cas_update_does_not_mutate_storage() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let v1 = ltm.create("test", None, "T", "B", Vec::new(), "main").unwrap();
    let err = ltm.update("test", "nope", v1.version + 1, "main").unwrap_err();
    assert!(matches!(err, LtmError::Conflict { .. }));

    let still_there = ltm.read("test").unwrap().unwrap();
    assert_eq!(still_there.version, v1.version);
    assert_eq!(still_there.body, "B");
}

/// Invariant: `gaps` over an empty summary set, given an explicit range,
/// returns the whole range as one gap.
#[test]
fn gaps_with_no_summaries_is_the_whole_range() {
    let substrate = Harness::memory();
    let temporal = &substrate.temporal;

    let m1 = temporal.append_message(MessageKind::User, "m1", 1).unwrap();
    let m2 = temporal.append_message(MessageKind::User, "m2", 1).unwrap();

    let found = gaps(&[], Some((&m1.id, &m2.id)));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].after, Some(m1.id));
    assert_eq!(found[0].before, Some(m2.id));
}
