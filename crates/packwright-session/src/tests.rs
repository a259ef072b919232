use std::collections::BTreeMap;

use anyhow::Result;
use packwright_core::{
    InstalledContent, InstalledPack, ManifestProvider, PackDefinition, PageDefinition, Provenance,
    TargetLookup,
};
use packwright_resolver::VersionIssue;
use proptest::prelude::*;
use serde_json::{json, Value};

use super::*;

fn pack(id: &str, version: &str, depends_on: &[&str], pages: &[&str]) -> PackDefinition {
    PackDefinition {
        id: id.to_string(),
        version: version.to_string(),
        description: String::new(),
        pages: pages
            .iter()
            .map(|key| PageDefinition {
                key: key.to_string(),
                file: format!("pages/{key}.wiki"),
                prefix: None,
            })
            .collect(),
        depends_on: depends_on.iter().map(|dep| dep.to_string()).collect(),
        tags: Vec::new(),
    }
}

fn installed(name: &str, version: &str) -> InstalledPack {
    InstalledPack {
        name: name.to_string(),
        version: version.to_string(),
    }
}

#[derive(Default)]
struct FakeTarget {
    pages: BTreeMap<String, (Option<Provenance>, Option<String>)>,
}

impl FakeTarget {
    fn with_page(mut self, title: &str, owner: Option<(&str, &str, &str)>, live: &str) -> Self {
        let provenance = owner.map(|(pack_id, source_id, hash)| Provenance {
            pack_id: pack_id.to_string(),
            source_id: source_id.to_string(),
            content_hash: hash.to_string(),
        });
        self.pages
            .insert(title.to_string(), (provenance, Some(live.to_string())));
        self
    }
}

impl TargetLookup for FakeTarget {
    fn exists(&self, title: &str) -> Result<bool> {
        Ok(self.pages.contains_key(title))
    }

    fn provenance(&self, title: &str) -> Result<Option<Provenance>> {
        Ok(self.pages.get(title).and_then(|(owner, _)| owner.clone()))
    }

    fn live_content_hash(&self, title: &str) -> Result<Option<String>> {
        Ok(self.pages.get(title).and_then(|(_, live)| live.clone()))
    }
}

struct FakeSource {
    packs: Vec<PackDefinition>,
    installed: Vec<InstalledPack>,
}

impl ManifestProvider for FakeSource {
    fn list_packs(&self, _source: &str, _reference: &str) -> Result<Vec<PackDefinition>> {
        Ok(self.packs.clone())
    }
}

impl InstalledContent for FakeSource {
    fn list_installed(&self, _source: &str, _reference: &str) -> Result<Vec<InstalledPack>> {
        Ok(self.installed.clone())
    }
}

fn key() -> SessionKey {
    SessionKey::new("alice", "main")
}

fn init_state(ctx: &ResolveContext<'_>) -> SelectionState {
    let (state, warnings) = commands::init(&key(), "origin", ctx).expect("init must succeed");
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    state
}

#[test]
fn select_auto_selects_dependency_with_reason() {
    let packs = vec![pack("A", "1.0.0", &[], &[]), pack("B", "1.0.0", &["A"], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);

    commands::select(&mut state, &ctx, "B").expect("select must succeed");

    let a = state.pack("A").expect("pack A must exist");
    assert!(!a.selected);
    assert!(a.auto_selected);
    assert_eq!(a.action, PackAction::Install);
    assert_eq!(a.auto_selected_reason.as_deref(), Some("Required by B"));
    assert_eq!(state.wanted().into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
}

#[test]
fn select_is_idempotent() {
    let packs = vec![
        pack("a", "1.0.0", &[], &["intro"]),
        pack("b", "1.0.0", &["a"], &["guide"]),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);

    commands::select(&mut state, &ctx, "b").expect("first select must succeed");
    let once = state.clone();
    commands::select(&mut state, &ctx, "b").expect("second select must succeed");

    assert_eq!(state, once);
    assert!(compute_diff(&once, &state).is_empty());
}

#[test]
fn select_unknown_pack_is_not_found() {
    let packs = vec![pack("a", "1.0.0", &[], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);

    let err = commands::select(&mut state, &ctx, "missing").expect_err("select must fail");
    assert!(matches!(
        err,
        SessionError::NotFound {
            kind: EntityKind::Pack,
            ..
        }
    ));
    assert_eq!(err.code(), "not_found");
}

#[test]
fn deselect_without_cascade_reports_dependents() {
    let packs = vec![pack("A", "1.0.0", &[], &[]), pack("B", "1.0.0", &["A"], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "A").expect("select A must succeed");
    commands::select(&mut state, &ctx, "B").expect("select B must succeed");
    let before = state.clone();

    let err = commands::deselect(&mut state, &ctx, "A", false).expect_err("deselect must fail");
    match err {
        SessionError::CascadeRequired {
            pack_id,
            dependents,
        } => {
            assert_eq!(pack_id, "A");
            assert_eq!(dependents, vec!["B".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(state, before, "a refused deselect must not mutate the state");
}

#[test]
fn cascade_deselect_removes_transitive_dependents_and_prunes_auto_selection() {
    let packs = vec![
        pack("base", "1.0.0", &[], &[]),
        pack("lib", "1.0.0", &["base"], &[]),
        pack("app", "1.0.0", &["lib"], &[]),
        pack("tool", "1.0.0", &["lib"], &[]),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "app").expect("select app must succeed");
    commands::select(&mut state, &ctx, "tool").expect("select tool must succeed");
    assert!(state.pack("base").expect("base").auto_selected);

    let (_, cascaded) =
        commands::deselect(&mut state, &ctx, "lib", true).expect("cascade must succeed");

    assert_eq!(cascaded, vec!["app".to_string(), "tool".to_string()]);
    assert!(state.wanted().is_empty());
    let base = state.pack("base").expect("base");
    assert!(!base.auto_selected);
    assert_eq!(base.auto_selected_reason, None);
}

#[test]
fn set_pack_prefix_rewrites_every_page_title() {
    let packs = vec![pack("A", "1.0.0", &[], &["p1", "p2"])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);

    commands::set_pack_prefix(&mut state, &ctx, "A", "Foo").expect("prefix must apply");

    let a = state.pack("A").expect("pack A");
    assert_eq!(a.prefix.as_deref(), Some("Foo"));
    assert_eq!(a.pages["p1"].final_title, "Foo/p1");
    assert_eq!(a.pages["p2"].final_title, "Foo/p2");
    assert_eq!(a.pages["p1"].default_title, "p1");

    commands::set_pack_prefix(&mut state, &ctx, "A", "").expect("empty prefix must apply");
    let a = state.pack("A").expect("pack A");
    assert_eq!(a.prefix, None);
    assert_eq!(a.pages["p1"].final_title, "p1");
}

#[test]
fn set_page_title_validates_input() {
    let packs = vec![pack("a", "1.0.0", &[], &["p1"])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);

    let blank = commands::set_page_title(&mut state, &ctx, "a", "p1", "   ")
        .expect_err("blank title must fail");
    assert_eq!(blank.code(), "invalid_input");

    let missing = commands::set_page_title(&mut state, &ctx, "a", "nope", "Title")
        .expect_err("unknown page must fail");
    assert!(matches!(
        missing,
        SessionError::NotFound {
            kind: EntityKind::Page,
            ..
        }
    ));

    commands::set_page_title(&mut state, &ctx, "a", "p1", " Welcome ")
        .expect("title must apply");
    assert_eq!(state.pack("a").expect("a").pages["p1"].final_title, "Welcome");
}

#[test]
fn duplicate_titles_between_wanted_packs_conflict_until_renamed() {
    let packs = vec![
        pack("alpha", "1.0.0", &[], &["Main"]),
        pack("beta", "1.0.0", &[], &["Main"]),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "alpha").expect("select alpha");
    assert!(!state.pack("alpha").expect("alpha").pages["Main"].has_conflict);

    commands::select(&mut state, &ctx, "beta").expect("select beta");
    for id in ["alpha", "beta"] {
        let page = &state.pack(id).expect("pack").pages["Main"];
        assert!(page.has_conflict);
        assert_eq!(page.conflict_type, Some(ConflictType::DuplicateTitle));
    }

    commands::set_pack_prefix(&mut state, &ctx, "beta", "Beta").expect("prefix beta");
    assert!(!state.pack("alpha").expect("alpha").pages["Main"].has_conflict);
    let beta = &state.pack("beta").expect("beta").pages["Main"];
    assert_eq!(beta.final_title, "Beta/Main");
    assert_eq!(beta.conflict_type, None);
}

#[test]
fn target_collisions_are_classified_by_provenance() {
    let packs = vec![pack(
        "a",
        "1.0.0",
        &[],
        &["Free", "Foreign", "Owned", "Sibling", "Rival"],
    )];
    let target = FakeTarget::default()
        .with_page("Foreign", None, "h0")
        .with_page("Owned", Some(("a", "origin", "h1")), "h1")
        .with_page("Sibling", Some(("other", "origin", "h2")), "h2")
        .with_page("Rival", Some(("a", "elsewhere", "h3")), "h3");
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "a").expect("select a");

    let pages = &state.pack("a").expect("a").pages;
    assert_eq!(pages["Free"].conflict_type, None);
    assert_eq!(
        pages["Foreign"].conflict_type,
        Some(ConflictType::ExternalCollision)
    );
    assert_eq!(pages["Owned"].conflict_type, None);
    assert_eq!(pages["Sibling"].conflict_type, None);
    assert_eq!(pages["Rival"].conflict_type, Some(ConflictType::PackConflict));

    for (title, page) in pages {
        let bucket = classify_title(title, &target, "origin").expect("classify");
        assert_eq!(
            page.conflict_type == Some(ConflictType::PackConflict),
            bucket == PreflightBucket::PackPackConflict,
            "conflict marker and preflight disagree on {title}"
        );
    }

    commands::deselect(&mut state, &ctx, "a", false).expect("deselect a");
    assert!(state
        .pack("a")
        .expect("a")
        .pages
        .values()
        .all(|page| !page.has_conflict));
}

#[test]
fn init_marks_installed_packs_and_derives_actions() {
    let packs = vec![
        pack("fresh", "1.0.0", &[], &[]),
        pack("current", "1.0.0", &[], &[]),
        pack("stale", "1.4.0", &[], &[]),
    ];
    let snapshot = vec![
        installed("current", "1.0.0"),
        installed("stale", "1.2.0"),
        installed("retired", "0.9.0"),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);
    let state = init_state(&ctx);

    let action = |id: &str| state.pack(id).expect("pack").action;
    assert_eq!(action("fresh"), PackAction::Install);
    assert_eq!(action("current"), PackAction::Unchanged);
    assert_eq!(action("stale"), PackAction::Update);
    assert_eq!(action("retired"), PackAction::Remove);
    assert!(state.pack("current").expect("current").selected);
    assert!(!state.pack("retired").expect("retired").selected);
    assert_eq!(state.pack("retired").expect("retired").target_version, None);
}

#[test]
fn major_update_keeps_installed_version_while_other_packs_apply() {
    let packs = vec![pack("x", "2.0.0", &[], &[]), pack("y", "1.0.0", &[], &[])];
    let snapshot = vec![installed("x", "1.0.0")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);

    let (mut state, warnings) = commands::init(&key(), "origin", &ctx).expect("init");
    assert_eq!(
        warnings,
        vec!["'x' stays at 1.0.0: 2.0.0 crosses a major version".to_string()]
    );
    let x = state.pack("x").expect("x");
    assert!(x.selected);
    assert!(x.is_held_back());
    assert_eq!(x.action, PackAction::Unchanged);

    let before = state.clone();
    commands::select(&mut state, &ctx, "x").expect("selecting a selected pack is a no-op");
    assert_eq!(state, before);

    commands::select(&mut state, &ctx, "y").expect("select y");
    let (operations, apply_warnings) = commands::apply(&state, &ctx).expect("apply");
    let order: Vec<(OperationAction, &str)> = operations
        .iter()
        .map(|op| (op.action, op.pack_id.as_str()))
        .collect();
    assert_eq!(order, vec![(OperationAction::Install, "y")]);
    assert_eq!(apply_warnings, warnings);
}

#[test]
fn reselecting_a_held_pack_keeps_it_instead_of_removing_it() {
    let packs = vec![pack("x", "2.0.0", &[], &[])];
    let snapshot = vec![installed("x", "1.0.0")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);
    let (mut state, _) = commands::init(&key(), "origin", &ctx).expect("init");

    commands::deselect(&mut state, &ctx, "x", false).expect("deselect x");
    assert_eq!(state.pack("x").expect("x").action, PackAction::Remove);

    let warnings = commands::select(&mut state, &ctx, "x").expect("select x");
    assert!(warnings
        .iter()
        .any(|warning| warning.contains("crosses a major version")));
    assert_eq!(state.pack("x").expect("x").action, PackAction::Unchanged);
    let err = commands::apply(&state, &ctx).expect_err("nothing left to apply");
    assert!(matches!(err, SessionError::NoOperations));
}

#[test]
fn apply_rejects_a_stored_major_update() {
    let packs = vec![pack("a", "2.0.0", &[], &[])];
    let snapshot = vec![installed("a", "1.2.3")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);
    let (mut state, _) = commands::init(&key(), "origin", &ctx).expect("init");
    state.packs.get_mut("a").expect("a").action = PackAction::Update;

    let err = commands::apply(&state, &ctx).expect_err("apply must be blocked");
    match err {
        SessionError::DependencyConflict(VersionIssue::MajorVersionChange {
            current,
            target,
            ..
        }) => {
            assert_eq!(current, "1.2.3");
            assert_eq!(target, "2.0.0");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unparsable_installed_version_only_blocks_that_pack() {
    let packs = vec![pack("a", "1.0.0", &[], &[]), pack("b", "1.0.0", &[], &[])];
    let snapshot = vec![installed("a", "release-2024")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);

    let (mut state, warnings) =
        commands::init(&key(), "origin", &ctx).expect("init tolerates the bad version");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("'a'"));
    assert!(warnings[0].contains("release-2024"));

    commands::select(&mut state, &ctx, "b").expect("select b");
    commands::refresh(&mut state, &ctx).expect("refresh");
    commands::deselect(&mut state, &ctx, "b", false).expect("deselect b");

    let err = commands::apply(&state, &ctx).expect_err("update of a cannot be checked");
    assert_eq!(err.code(), "invalid_input");
    assert!(err.to_string().contains("cannot update 'a'"));

    commands::deselect(&mut state, &ctx, "a", false).expect("deselect a");
    let err = commands::select(&mut state, &ctx, "a").expect_err("select a must fail");
    assert_eq!(err.code(), "invalid_input");
    assert!(err.to_string().contains("cannot select 'a'"));
    assert!(!state.pack("a").expect("a").selected);
}

#[test]
fn installed_dependency_is_auto_selected_again_after_being_deselected() {
    let packs = vec![
        pack("a", "1.0.0", &[], &["a-page"]),
        pack("b", "1.0.0", &["a"], &["b-page"]),
    ];
    let snapshot = vec![installed("a", "1.0.0")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);
    let mut state = init_state(&ctx);

    commands::deselect(&mut state, &ctx, "a", false).expect("deselect a");
    assert_eq!(state.pack("a").expect("a").action, PackAction::Remove);

    commands::select(&mut state, &ctx, "b").expect("select b");
    let a = state.pack("a").expect("a");
    assert!(!a.selected);
    assert!(a.auto_selected);
    assert_eq!(a.auto_selected_reason.as_deref(), Some("Required by b"));
    assert_eq!(a.action, PackAction::Unchanged);

    let (operations, _) = commands::apply(&state, &ctx).expect("apply");
    let order: Vec<(OperationAction, &str)> = operations
        .iter()
        .map(|op| (op.action, op.pack_id.as_str()))
        .collect();
    assert_eq!(order, vec![(OperationAction::Install, "b")]);
}

#[test]
fn updating_a_dependency_warns_about_installed_dependents() {
    let packs = vec![
        pack("lib", "1.3.0", &[], &[]),
        pack("app", "1.0.0", &["lib"], &[]),
    ];
    let snapshot = vec![installed("lib", "1.2.0"), installed("app", "1.0.0")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);

    let (state, warnings) = commands::init(&key(), "origin", &ctx).expect("init");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("installed dependents are not: app"));

    let (operations, apply_warnings) = commands::apply(&state, &ctx).expect("apply");
    assert_eq!(apply_warnings, warnings);
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].action, OperationAction::Update);
    assert_eq!(operations[0].target_version.as_deref(), Some("1.3.0"));
}

#[test]
fn refresh_keeps_user_choices() {
    let before = vec![
        pack("a", "1.0.0", &[], &["p1"]),
        pack("b", "1.0.0", &["a"], &["q1"]),
        pack("gone", "1.0.0", &[], &[]),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&before, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "b").expect("select b");
    commands::select(&mut state, &ctx, "gone").expect("select gone");
    commands::set_pack_prefix(&mut state, &ctx, "a", "Lib").expect("prefix a");
    commands::set_page_title(&mut state, &ctx, "b", "q1", "Custom").expect("title q1");

    let after = vec![
        pack("a", "1.1.0", &[], &["p1", "p2"]),
        pack("b", "1.0.0", &["a"], &["q1", "q2"]),
        pack("c", "1.0.0", &[], &[]),
    ];
    let ctx = ResolveContext::new(&after, &[], &target);
    let warnings = commands::refresh(&mut state, &ctx).expect("refresh");

    assert!(warnings
        .iter()
        .any(|warning| warning.contains("'gone' is no longer offered")));
    assert!(state.pack("gone").is_none());
    assert!(state.pack("b").expect("b").selected);
    let a = state.pack("a").expect("a");
    assert!(a.auto_selected);
    assert_eq!(a.target_version.as_deref(), Some("1.1.0"));
    assert_eq!(a.pages["p1"].final_title, "Lib/p1");
    assert_eq!(a.pages["p2"].final_title, "Lib/p2");
    let b = state.pack("b").expect("b");
    assert_eq!(b.pages["q1"].final_title, "Custom");
    assert_eq!(b.pages["q2"].final_title, "q2");
    assert!(!state.pack("c").expect("c").is_wanted());
}

#[test]
fn apply_orders_writes_by_dependency_then_removals_in_reverse() {
    let packs = vec![
        pack("c", "1.0.0", &["b"], &["c-page"]),
        pack("b", "1.0.0", &["a"], &[]),
        pack("a", "1.0.0", &[], &[]),
        pack("x", "1.0.0", &[], &[]),
        pack("y", "1.0.0", &["x"], &[]),
    ];
    let snapshot = vec![installed("x", "1.0.0"), installed("y", "1.0.0")];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &snapshot, &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "c").expect("select c");
    let (_, cascaded) = commands::deselect(&mut state, &ctx, "x", true).expect("deselect x");
    assert_eq!(cascaded, vec!["y".to_string()]);

    let (operations, warnings) = commands::apply(&state, &ctx).expect("apply");
    assert!(warnings.is_empty());

    let order: Vec<(OperationAction, &str)> = operations
        .iter()
        .map(|op| (op.action, op.pack_id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (OperationAction::Install, "a"),
            (OperationAction::Install, "b"),
            (OperationAction::Install, "c"),
            (OperationAction::Remove, "y"),
            (OperationAction::Remove, "x"),
        ]
    );
    assert_eq!(operations[2].pages[0].final_title, "c-page");
    assert_eq!(operations[3].target_version, None);
}

#[test]
fn apply_with_nothing_to_do_fails() {
    let packs = vec![pack("a", "1.0.0", &[], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let state = init_state(&ctx);

    let err = commands::apply(&state, &ctx).expect_err("apply must fail");
    assert!(matches!(err, SessionError::NoOperations));
}

#[test]
fn diff_reports_only_changed_fields() {
    let packs = vec![pack("A", "1.0.0", &[], &["p1"]), pack("B", "1.0.0", &["A"], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "B").expect("select B");
    let before = state.clone();

    commands::deselect(&mut state, &ctx, "B", false).expect("deselect B");
    let diff = compute_diff(&before, &state);
    let value = serde_json::to_value(&diff).expect("diff must serialize");

    assert_eq!(
        value,
        json!({
            "packs": {
                "A": { "auto_selected": false, "auto_selected_reason": null },
                "B": { "selected": false },
            }
        })
    );
    assert_eq!(apply_diff(&before, &diff), state);
}

#[test]
fn diff_emits_new_packs_in_full_and_lists_removed_ones() {
    let packs = vec![pack("a", "1.0.0", &[], &["p1"])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let old = init_state(&ctx);

    let mut new = old.clone();
    new.packs.remove("a");
    new.packs.insert("z".to_string(), PackSelection::default());
    let diff = compute_diff(&old, &new);

    assert_eq!(diff.removed, vec!["a".to_string()]);
    let z = &diff.packs["z"];
    assert_eq!(z.selected, Some(false));
    assert_eq!(z.prefix, Some(None));
    assert_eq!(z.action, Some(PackAction::Unchanged));
    assert_eq!(apply_diff(&old, &diff), new);
}

#[test]
fn content_hash_is_deterministic() {
    let packs = vec![pack("a", "1.0.0", &[], &["p1"]), pack("b", "1.0.0", &["a"], &[])];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let first = init_state(&ctx);
    let second = init_state(&ctx);

    let hash = first.content_hash().expect("hash");
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, second.content_hash().expect("hash"));

    let mut changed = second;
    commands::select(&mut changed, &ctx, "b").expect("select b");
    assert_ne!(hash, changed.content_hash().expect("hash"));
}

#[test]
fn sha256_hex_matches_known_digest() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn preflight_classifies_by_provenance_and_live_hash() {
    let target = FakeTarget::default()
        .with_page("Shared", Some(("A", "X", "H")), "H")
        .with_page("Edited", Some(("A", "X", "H")), "H2")
        .with_page("Manual", None, "M");

    let bucket = |title: &str, source: &str| {
        classify_title(title, &target, source).expect("classification must succeed")
    };
    assert_eq!(bucket("Shared", "X"), PreflightBucket::UpdateUnchanged);
    assert_eq!(bucket("Shared", "Y"), PreflightBucket::PackPackConflict);
    assert_eq!(bucket("Edited", "X"), PreflightBucket::UpdateModified);
    assert_eq!(bucket("Manual", "X"), PreflightBucket::ExternalCollision);
    assert_eq!(bucket("Brand New", "X"), PreflightBucket::Create);

    let report = classify(
        ["Shared", "Edited", "Manual", "Brand New", "Shared"],
        &target,
        "X",
    )
    .expect("classify must succeed");
    assert_eq!(report.create, vec!["Brand New".to_string()]);
    assert_eq!(report.update_unchanged, vec!["Shared".to_string()]);
    assert_eq!(report.update_modified, vec!["Edited".to_string()]);
    assert_eq!(report.external_collision, vec!["Manual".to_string()]);
    let counts = report.counts();
    assert_eq!(counts.total(), 4);
    assert_eq!(counts.pack_pack_conflict, 0);
    assert!(!report.is_clean());
}

#[test]
fn planned_titles_cover_wanted_pages_only() {
    let packs = vec![
        pack("a", "1.0.0", &[], &["p1"]),
        pack("b", "1.0.0", &["a"], &["q1"]),
        pack("c", "1.0.0", &[], &["r1"]),
    ];
    let target = FakeTarget::default();
    let ctx = ResolveContext::new(&packs, &[], &target);
    let mut state = init_state(&ctx);
    commands::select(&mut state, &ctx, "b").expect("select b");

    assert_eq!(planned_titles(&state), vec!["p1".to_string(), "q1".to_string()]);
}

#[test]
fn command_requests_parse_camel_case_payloads() {
    let request = |command: &str, payload: Value| CommandRequest {
        command: command.to_string(),
        source: "origin".to_string(),
        reference: "main".to_string(),
        payload,
    };

    assert_eq!(
        Command::from_request(&request("deselect", json!({"packId": "a", "cascade": true})))
            .expect("deselect must parse"),
        Command::Deselect {
            pack_id: "a".to_string(),
            cascade: true,
        }
    );
    assert_eq!(
        Command::from_request(&request(
            "setPageTitle",
            json!({"packId": "a", "pageKey": "p1", "title": "T"})
        ))
        .expect("setPageTitle must parse"),
        Command::SetPageTitle {
            pack_id: "a".to_string(),
            page_key: "p1".to_string(),
            title: "T".to_string(),
        }
    );
    assert_eq!(
        Command::from_request(&request("init", Value::Null)).expect("init must parse"),
        Command::Init
    );

    let missing = Command::from_request(&request("select", json!({})))
        .expect_err("missing packId must fail");
    assert_eq!(missing.code(), "invalid_input");
    let unknown = Command::from_request(&request("explode", Value::Null))
        .expect_err("unknown command must fail");
    assert!(unknown.to_string().contains("unknown command 'explode'"));
}

#[test]
fn request_json_uses_ref_field() {
    let request: CommandRequest = serde_json::from_value(json!({
        "command": "select",
        "source": "origin",
        "ref": "main",
        "payload": {"packId": "a"}
    }))
    .expect("request must deserialize");
    assert_eq!(request.reference, "main");
}

#[test]
fn processor_round_trips_through_the_store() {
    let source = FakeSource {
        packs: vec![
            pack("a", "1.0.0", &[], &["p1"]),
            pack("b", "1.0.0", &["a"], &["q1"]),
        ],
        installed: Vec::new(),
    };
    let target = FakeTarget::default().with_page("q1", Some(("b", "origin", "h")), "h");
    let store = MemorySessionStore::new();
    let processor = CommandProcessor::new(&source, &source, &target, &store);
    let key = key();

    let init = processor
        .run(&key, "origin", Command::Init)
        .expect("init must succeed");
    let state = init.state.expect("init returns full state");
    assert_eq!(init.hash, Some(state.content_hash().expect("hash")));
    assert!(init.diff.is_none());

    let select = processor
        .execute(
            "alice",
            &CommandRequest {
                command: "select".to_string(),
                source: "origin".to_string(),
                reference: "main".to_string(),
                payload: json!({"packId": "b"}),
            },
        )
        .expect("select must succeed");
    assert!(select.state.is_none());
    let diff = select.diff.expect("select returns a diff");
    assert_eq!(diff.packs["a"].auto_selected, Some(true));
    let stored = processor
        .session(&key)
        .expect("store must be readable")
        .expect("session must exist");
    assert_eq!(select.hash, Some(stored.content_hash().expect("hash")));

    let report = processor.preflight(&key, "origin").expect("preflight");
    assert_eq!(report.create, vec!["p1".to_string()]);
    assert_eq!(report.update_unchanged, vec!["q1".to_string()]);

    let apply = processor
        .run(&key, "origin", Command::Apply)
        .expect("apply must succeed");
    let operations = apply.operations.expect("apply returns operations");
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].pack_id, "a");
    assert!(processor.session(&key).expect("store").is_none());
}

#[test]
fn processor_reports_missing_session_and_source_mismatch() {
    let source = FakeSource {
        packs: vec![pack("a", "1.0.0", &[], &[])],
        installed: Vec::new(),
    };
    let target = FakeTarget::default();
    let store = MemorySessionStore::new();
    let processor = CommandProcessor::new(&source, &source, &target, &store);
    let key = key();

    let err = processor
        .run(&key, "origin", Command::Refresh)
        .expect_err("refresh without a session must fail");
    assert!(matches!(
        err,
        SessionError::NotFound {
            kind: EntityKind::Session,
            ..
        }
    ));

    processor
        .run(&key, "origin", Command::Init)
        .expect("init must succeed");
    let err = processor
        .run(
            &key,
            "elsewhere",
            Command::Select {
                pack_id: "a".to_string(),
            },
        )
        .expect_err("source mismatch must fail");
    assert_eq!(err.code(), "invalid_input");
}

#[test]
fn processor_keeps_session_when_apply_has_nothing_to_do() {
    let source = FakeSource {
        packs: vec![pack("a", "1.0.0", &[], &[])],
        installed: vec![installed("a", "1.0.0")],
    };
    let target = FakeTarget::default();
    let store = MemorySessionStore::new();
    let processor = CommandProcessor::new(&source, &source, &target, &store);
    let key = key();

    processor.run(&key, "origin", Command::Init).expect("init");
    let err = processor
        .run(&key, "origin", Command::Apply)
        .expect_err("apply must fail");
    assert!(matches!(err, SessionError::NoOperations));
    assert!(processor.session(&key).expect("store").is_some());

    let cleared = processor.run(&key, "origin", Command::Clear).expect("clear");
    assert_eq!(cleared, CommandResponse::default());
    assert!(store.is_empty().expect("store"));
    processor
        .run(&key, "origin", Command::Clear)
        .expect("clearing twice is fine");
}

#[test]
fn deselect_response_carries_cascade_list() {
    let source = FakeSource {
        packs: vec![pack("a", "1.0.0", &[], &[]), pack("b", "1.0.0", &["a"], &[])],
        installed: Vec::new(),
    };
    let target = FakeTarget::default();
    let store = MemorySessionStore::new();
    let processor = CommandProcessor::new(&source, &source, &target, &store);
    let key = key();

    processor.run(&key, "origin", Command::Init).expect("init");
    for id in ["a", "b"] {
        processor
            .run(
                &key,
                "origin",
                Command::Select {
                    pack_id: id.to_string(),
                },
            )
            .expect("select");
    }

    let response = processor
        .run(
            &key,
            "origin",
            Command::Deselect {
                pack_id: "a".to_string(),
                cascade: true,
            },
        )
        .expect("cascade deselect");
    assert_eq!(response.cascade, Some(vec!["b".to_string()]));
    let value = serde_json::to_value(&response).expect("response must serialize");
    assert_eq!(value["cascade"], json!(["b"]));
    assert!(value.get("operations").is_none());
}

fn conflict_strategy() -> impl Strategy<Value = Option<ConflictType>> {
    prop_oneof![
        Just(None),
        Just(Some(ConflictType::ExternalCollision)),
        Just(Some(ConflictType::PackConflict)),
        Just(Some(ConflictType::DuplicateTitle)),
    ]
}

fn action_strategy() -> impl Strategy<Value = PackAction> {
    prop_oneof![
        Just(PackAction::Install),
        Just(PackAction::Update),
        Just(PackAction::Remove),
        Just(PackAction::Unchanged),
    ]
}

fn page_strategy() -> impl Strategy<Value = PageSelection> {
    ("[a-c]{1,2}", "[a-c]{1,2}", "[a-c/]{1,3}", any::<bool>(), conflict_strategy()).prop_map(
        |(name, default_title, final_title, has_conflict, conflict_type)| PageSelection {
            name,
            default_title,
            final_title,
            has_conflict,
            conflict_type,
        },
    )
}

fn pack_strategy() -> impl Strategy<Value = PackSelection> {
    (
        any::<bool>(),
        any::<bool>(),
        proptest::option::of("Required by [a-c]"),
        action_strategy(),
        proptest::option::of("1\\.[0-2]\\.0"),
        proptest::option::of("1\\.[0-2]\\.0"),
        proptest::option::of("[A-C]"),
        proptest::collection::btree_map("p[0-3]", page_strategy(), 0..4),
    )
        .prop_map(
            |(
                selected,
                auto_selected,
                auto_selected_reason,
                action,
                current_version,
                target_version,
                prefix,
                pages,
            )| PackSelection {
                selected,
                auto_selected,
                auto_selected_reason,
                action,
                current_version,
                target_version,
                prefix,
                pages,
            },
        )
}

fn state_strategy() -> impl Strategy<Value = SelectionState> {
    proptest::collection::btree_map("[a-e]", pack_strategy(), 0..5).prop_map(|packs| {
        let mut state = SelectionState::new(&key(), "origin");
        state.packs = packs;
        state
    })
}

proptest! {
    #[test]
    fn diff_overlay_reproduces_new_state(old in state_strategy(), new in state_strategy()) {
        let diff = compute_diff(&old, &new);
        prop_assert_eq!(apply_diff(&old, &diff), new);
    }

    #[test]
    fn diff_of_identical_states_is_empty(state in state_strategy()) {
        prop_assert!(compute_diff(&state, &state).is_empty());
    }
}
