//! Round-trip laws: create -> read -> update chains, edit/update
//! equivalence, and rename/reparent inverses.

use vellum_core::LtmError;
use vellum_e2e_tests::Harness;

/// create -> read -> update -> read preserves untouched fields across the
/// chain (title, parent, links survive a body-only update).
#[test]
fn create_read_update_preserves_untouched_fields() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let created = ltm
        .create("test", None, "Original Title", "v1", vec!["tag-a".to_string()], "main")
        .unwrap();
    let read_back = ltm.read("test").unwrap().unwrap();
    assert_eq!(read_back, created);

    let updated = ltm.update("test", "v2", read_back.version, "ltm-consolidate").unwrap();
    assert_eq!(updated.title, "Original Title");
    assert_eq!(updated.links, vec!["tag-a".to_string()]);
    assert_eq!(updated.body, "v2");
    assert_eq!(updated.version, created.version + 1);

    let final_read = ltm.read("test").unwrap().unwrap();
    assert_eq!(final_read, updated);
}

/// `edit` with a uniquely-occurring needle produces the same stored entry
/// as an equivalent `update` with the substitution applied by hand.
#[test]
fn edit_is_equivalent_to_an_update_with_the_same_result() {
    let substrate_a = Harness::memory();
    let substrate_b = Harness::memory();

    substrate_a
        .ltm
        .create("test", None, "T", "the quick fox", Vec::new(), "main")
        .unwrap();
    substrate_b
        .ltm
        .create("test", None, "T", "the quick fox", Vec::new(), "main")
        .unwrap();

    let via_edit = substrate_a.ltm.edit("test", "quick", "slow", 1, "main").unwrap();
    let via_update = substrate_b.ltm.update("test", "the slow fox", 1, "main").unwrap();

    assert_eq!(via_edit.body, via_update.body);
    assert_eq!(via_edit.version, via_update.version);
}

/// `edit` rejects a needle occurring more than once, since the replacement
/// site would be ambiguous.
#[test]
fn edit_rejects_an_ambiguous_needle() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    ltm.create("test", None, "T", "a a a", Vec::new(), "main").unwrap();
    let err = ltm.edit("test", "a", "b", 1, "main").unwrap_err();
    assert!(matches!(err, LtmError::AmbiguousEdit));
}

/// `rename(a, b)` followed by `rename(b, a)` restores the entry to its
/// original slug/path, byte for byte apart from `version`/`updated_at`.
#[test]
fn rename_there_and_back_restores_the_original() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    let original = ltm.create("a", None, "T", "B", Vec::new(), "main").unwrap();
    let renamed = ltm.rename("a", "b", original.version, "main").unwrap();
    assert_eq!(renamed.slug, "b");
    assert_eq!(renamed.path, "/b");

    let restored = ltm.rename("b", "a", renamed.version, "main").unwrap();
    assert_eq!(restored.slug, original.slug);
    assert_eq!(restored.path, original.path);
    assert_eq!(restored.title, original.title);
    assert_eq!(restored.body, original.body);
}

/// `reparent(x, null)` followed by `reparent(x, original_parent)` restores
/// the subtree, including descendant paths.
#[test]
fn reparent_there_and_back_restores_the_subtree() {
    let substrate = Harness::memory();
    let ltm = &substrate.ltm;

    ltm.create("knowledge", None, "T", "B", Vec::new(), "main").unwrap();
    let react = ltm
        .create("react", Some("knowledge"), "T", "B", Vec::new(), "main")
        .unwrap();
    ltm.create("hooks", Some("react"), "T", "B", Vec::new(), "main").unwrap();

    let detached = ltm.reparent("react", None, react.version, "main").unwrap();
    assert_eq!(detached.path, "/react");
    assert_eq!(ltm.read("hooks").unwrap().unwrap().path, "/react/hooks");

    let restored = ltm.reparent("react", Some("knowledge"), detached.version, "main").unwrap();
    assert_eq!(restored.path, "/knowledge/react");
    assert_eq!(ltm.read("hooks").unwrap().unwrap().path, "/knowledge/react/hooks");
}
