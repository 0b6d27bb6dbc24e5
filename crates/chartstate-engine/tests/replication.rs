//! Integration tests for containers sharing entries through the hub.
//!
//! # Tiers
//!
//! - **Tier 1:** attach/detach: initial mirror exchange, cleanup, ordering
//! - **Tier 2:** live propagation: add/update/remove, content, no echo
//! - **Tier 3:** history across the hub: undo/redo round trips

use std::cell::RefCell;
use std::rc::Rc;

use chartstate_engine::{
    ChangeBatch, ChangeOrigin, Container, EngineError, ReplicationHub, Result,
};
use chartstate_types::{
    ChangeReason, ContainerId, EntryOptions, EntrySpec, OptionsPatch, Reference, VisibilityScope,
};

// ============================================================================
// Shared test setup
// ============================================================================

fn cid(s: &str) -> ContainerId {
    ContainerId::from(s)
}

fn container(id: &str, specs: Vec<EntrySpec>) -> Container {
    let mut container = Container::new(id);
    container.load(specs).unwrap();
    container
}

/// ds1 = [e0 '*', e1, e2 ['ds3']], ds2 = [e2, e3 ['ds1']].
fn scenario() -> ReplicationHub {
    let mut hub = ReplicationHub::new();
    hub.attach(container(
        "ds1",
        vec![
            EntrySpec::new("e").with_id("e0").with_visibility(VisibilityScope::All),
            EntrySpec::new("e").with_id("e1"),
            EntrySpec::new("e")
                .with_id("e2")
                .with_visibility(VisibilityScope::only(["ds3"])),
        ],
    ))
    .unwrap();
    hub.attach(container(
        "ds2",
        vec![
            EntrySpec::new("e").with_id("e2"),
            EntrySpec::new("e")
                .with_id("e3")
                .with_visibility(VisibilityScope::only(["ds1"])),
        ],
    ))
    .unwrap();
    hub
}

fn refs(hub: &ReplicationHub, id: &str) -> Vec<Reference> {
    hub.container(&cid(id)).unwrap().references()
}

fn snapshot(hub: &ReplicationHub, id: &str) -> Vec<(Reference, EntryOptions)> {
    hub.container(&cid(id))
        .unwrap()
        .entries()
        .map(|e| (e.reference.clone(), e.options.clone()))
        .collect()
}

fn record_batches(hub: &mut ReplicationHub, id: &str) -> Rc<RefCell<Vec<ChangeBatch>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    hub.container_mut(&cid(id))
        .unwrap()
        .subscribe(move |batch: &ChangeBatch| sink.borrow_mut().push(batch.clone()));
    seen
}

/// Foreign runs first, one run per owner, natives after.
fn assert_layout(container: &Container) {
    let references = container.references();
    let first_native = references
        .iter()
        .position(|r| r.is_native())
        .unwrap_or(references.len());
    assert!(
        references[first_native..].iter().all(|r| r.is_native()),
        "foreign entry after a native one in {}: {references:?}",
        container.id()
    );

    let mut seen_owners: Vec<&ContainerId> = Vec::new();
    for reference in &references[..first_native] {
        let owner = reference.owner().unwrap();
        if seen_owners.last() != Some(&owner) {
            assert!(
                !seen_owners.contains(&owner),
                "owner {owner} split into two runs in {}",
                container.id()
            );
            seen_owners.push(owner);
        }
    }
}

// ============================================================================
// Tier 1: attach / detach
// ============================================================================

#[test]
fn test_attach_scenario_layout() {
    let hub = scenario();

    assert_eq!(
        refs(&hub, "ds1"),
        vec![
            Reference::foreign("ds2", "e3"),
            Reference::native("e0"),
            Reference::native("e1"),
            Reference::native("e2"),
        ]
    );
    assert_eq!(
        refs(&hub, "ds2"),
        vec![
            Reference::foreign("ds1", "e0"),
            Reference::native("e2"),
            Reference::native("e3"),
        ]
    );
}

#[test]
fn test_attach_third_container_pulls_scoped_entries() {
    let mut hub = scenario();
    hub.attach(container("ds3", vec![EntrySpec::new("e").with_id("e9")]))
        .unwrap();

    assert_eq!(
        refs(&hub, "ds3"),
        vec![
            Reference::foreign("ds1", "e0"),
            Reference::foreign("ds1", "e2"),
            Reference::native("e9"),
        ]
    );
    // Nothing of ds3 is shared.
    assert_eq!(refs(&hub, "ds1").len(), 4);
    for id in ["ds1", "ds2", "ds3"] {
        assert_layout(hub.container(&cid(id)).unwrap());
    }
}

#[test]
fn test_mirror_is_a_distinct_copy() {
    let hub = scenario();
    let mirror = hub
        .container(&cid("ds2"))
        .unwrap()
        .entry(&Reference::foreign("ds1", "e0"))
        .unwrap();
    assert!(!mirror.valid);
    assert_eq!(mirror.options.visibility, VisibilityScope::All);
}

#[test]
fn test_detach_removes_mirrors_both_ways() {
    let mut hub = scenario();
    let ds2 = hub.detach(&cid("ds2")).unwrap();

    assert_eq!(
        ds2.references(),
        vec![Reference::native("e2"), Reference::native("e3")]
    );
    assert_eq!(
        refs(&hub, "ds1"),
        vec![
            Reference::native("e0"),
            Reference::native("e1"),
            Reference::native("e2"),
        ]
    );
    assert!(!hub.is_attached(&cid("ds2")));
}

#[test]
fn test_detached_container_no_longer_replicates() {
    let mut hub = scenario();
    let mut ds2 = hub.detach(&cid("ds2")).unwrap();

    ds2.transact("draw", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
    })
    .unwrap();
    hub.sync().unwrap();
    assert_eq!(refs(&hub, "ds1").len(), 3);
}

#[test]
fn test_reattach_restores_mirrors() {
    let mut hub = scenario();
    let ds2 = hub.detach(&cid("ds2")).unwrap();
    hub.attach(ds2).unwrap();

    assert_eq!(refs(&hub, "ds1")[0], Reference::foreign("ds2", "e3"));
    assert_eq!(refs(&hub, "ds2")[0], Reference::foreign("ds1", "e0"));
}

#[test]
fn test_layout_holds_across_attach_detach_sequence() {
    let mut hub = scenario();
    hub.attach(container(
        "ds3",
        vec![
            EntrySpec::new("e").with_id("f0").with_visibility(VisibilityScope::All),
            EntrySpec::new("e").with_id("f1").with_visibility(VisibilityScope::All),
        ],
    ))
    .unwrap();

    hub.transact(&cid("ds2"), "share", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
    })
    .unwrap();

    let ds2 = hub.detach(&cid("ds2")).unwrap();
    hub.transact(&cid("ds1"), "share", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
    })
    .unwrap();
    hub.attach(ds2).unwrap();

    for id in ["ds1", "ds2", "ds3"] {
        let container = hub.container(&cid(id)).unwrap();
        assert_layout(container);
    }

    let natives: Vec<_> = hub
        .container(&cid("ds1"))
        .unwrap()
        .native_entries()
        .map(|e| e.reference.local_id().to_string())
        .collect();
    assert_eq!(natives, ["e0", "e1", "e2", "e3"]);
}

// ============================================================================
// Tier 2: live propagation
// ============================================================================

#[test]
fn test_add_shared_entry_mirrors_once() {
    let mut hub = scenario();
    let ds1 = cid("ds1");

    let added = hub
        .transact(&ds1, "draw", |c| {
            c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
        })
        .unwrap();
    assert_eq!(added, Reference::native("e3"));

    let mirror = Reference::foreign("ds1", "e3");
    let ds2_refs = refs(&hub, "ds2");
    assert_eq!(ds2_refs.iter().filter(|r| **r == mirror).count(), 1);
    // Joins ds1's run, ahead of ds2's natives.
    assert_eq!(ds2_refs[..2], [Reference::foreign("ds1", "e0"), mirror]);
}

#[test]
fn test_update_invalidates_mirror_without_removing() {
    let mut hub = scenario();
    let mirror = Reference::foreign("ds1", "e0");
    hub.container_mut(&cid("ds2"))
        .unwrap()
        .mark_rendered(&mirror)
        .unwrap();

    hub.transact(&cid("ds1"), "recolor", |c| {
        c.update(&Reference::native("e0"), &OptionsPatch::new().set("color", "red"))
    })
    .unwrap();

    let ds2 = hub.container(&cid("ds2")).unwrap();
    let entry = ds2.entry(&mirror).unwrap();
    assert!(!entry.valid);
    assert_eq!(entry.options.get("color"), Some(&"red".into()));
}

#[test]
fn test_remove_removes_mirror() {
    let mut hub = scenario();
    hub.transact(&cid("ds1"), "delete", |c| c.remove(&Reference::native("e0")))
        .unwrap();
    assert_eq!(
        refs(&hub, "ds2"),
        vec![Reference::native("e2"), Reference::native("e3")]
    );
}

#[test]
fn test_no_echo_back_to_origin() {
    let mut hub = scenario();
    let ds1_batches = record_batches(&mut hub, "ds1");
    let ds2_batches = record_batches(&mut hub, "ds2");

    hub.transact(&cid("ds1"), "recolor", |c| {
        c.update(&Reference::native("e0"), &OptionsPatch::new().set("color", "red"))
    })
    .unwrap();

    let ds1_batches = ds1_batches.borrow();
    assert_eq!(ds1_batches.len(), 1);
    assert_eq!(ds1_batches[0].origin(), ChangeOrigin::Local);

    let ds2_batches = ds2_batches.borrow();
    assert_eq!(ds2_batches.len(), 1);
    assert!(ds2_batches[0].is_shared());
    assert_eq!(ds2_batches[0].entries(ChangeReason::UpdateEntry).count(), 1);
}

#[test]
fn test_edit_through_mirror_reaches_origin_and_peers() {
    let mut hub = scenario();
    hub.attach(Container::new("ds3")).unwrap();

    hub.transact(&cid("ds2"), "recolor", |c| {
        c.update(
            &Reference::foreign("ds1", "e0"),
            &OptionsPatch::new().set("color", "blue"),
        )
    })
    .unwrap();

    let blue = Some(serde_json::Value::from("blue"));
    let origin = hub.container(&cid("ds1")).unwrap();
    assert_eq!(
        origin.entry(&Reference::native("e0")).unwrap().options.get("color").cloned(),
        blue
    );
    let peer = hub.container(&cid("ds3")).unwrap();
    assert_eq!(
        peer.entry(&Reference::foreign("ds1", "e0"))
            .unwrap()
            .options
            .get("color")
            .cloned(),
        blue
    );
}

#[test]
fn test_content_refresh_invalidates_mirrors() {
    let mut hub = scenario();
    let ds2_batches = record_batches(&mut hub, "ds2");
    let depth = hub.container(&cid("ds1")).unwrap().timeline().undo_depth();

    hub.process_content(
        &cid("ds1"),
        &[Reference::native("e0"), Reference::native("e1")],
        |e| e.render_state = Some(serde_json::json!({"bars": 120})),
        ChangeReason::DataInvalid,
    )
    .unwrap();

    assert_eq!(
        hub.container(&cid("ds1")).unwrap().timeline().undo_depth(),
        depth
    );
    let ds2_batches = ds2_batches.borrow();
    assert_eq!(ds2_batches.len(), 1);
    // e1 is not shared, so only e0's mirror is touched.
    let touched: Vec<_> = ds2_batches[0]
        .entries(ChangeReason::DataInvalid)
        .map(|e| e.reference.clone())
        .collect();
    assert_eq!(touched, vec![Reference::foreign("ds1", "e0")]);
}

#[test]
fn test_cache_reasons_are_not_replicated() {
    let mut hub = scenario();
    let ds2_batches = record_batches(&mut hub, "ds2");

    hub.container_mut(&cid("ds1")).unwrap().invalidate_all();
    hub.sync().unwrap();
    assert!(ds2_batches.borrow().is_empty());
}

#[test]
fn test_sharing_with_explicit_scope() {
    let mut hub = scenario();
    hub.attach(Container::new("ds3")).unwrap();

    hub.transact(&cid("ds2"), "share", |c| {
        c.update(
            &Reference::native("e2"),
            &OptionsPatch::new().visibility(VisibilityScope::only(["ds3"])),
        )
    })
    .unwrap();

    assert!(
        hub.container(&cid("ds3"))
            .unwrap()
            .has(&Reference::foreign("ds2", "e2"))
    );
    assert!(
        !hub.container(&cid("ds1"))
            .unwrap()
            .has(&Reference::foreign("ds2", "e2"))
    );
}

#[test]
fn test_transaction_error_still_syncs() {
    let mut hub = scenario();
    let result: Result<()> = hub.transact(&cid("ds1"), "draw", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))?;
        c.remove(&Reference::native("ghost"))
    });

    assert!(matches!(result, Err(EngineError::ReferenceNotFound(_))));
    assert!(
        hub.container(&cid("ds2"))
            .unwrap()
            .has(&Reference::foreign("ds1", "e3"))
    );
}

#[test]
fn test_transact_on_unknown_container_fails() {
    let mut hub = scenario();
    let err = hub
        .transact(&cid("ds9"), "draw", |c| c.add(EntrySpec::new("e")))
        .unwrap_err();
    assert!(matches!(err, EngineError::IllegalState(_)));
}

// ============================================================================
// Tier 3: history across the hub
// ============================================================================

#[test]
fn test_undo_redo_round_trip_in_every_container() {
    let mut hub = scenario();
    let ds1 = cid("ds1");
    let ids = ["ds1", "ds2"];
    let capture = |hub: &ReplicationHub| ids.map(|id| snapshot(hub, id));

    let mut states = vec![capture(&hub)];
    hub.transact(&ds1, "draw", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
    })
    .unwrap();
    states.push(capture(&hub));
    hub.transact(&ds1, "recolor", |c| {
        c.update(&Reference::native("e0"), &OptionsPatch::new().set("color", "red"))?;
        c.update(&Reference::native("e3"), &OptionsPatch::new().set("width", 3))
    })
    .unwrap();
    states.push(capture(&hub));
    hub.transact(&ds1, "delete", |c| c.remove(&Reference::native("e0")))
        .unwrap();
    states.push(capture(&hub));

    for expected in states.iter().rev().skip(1) {
        hub.undo(&ds1).unwrap();
        assert_eq!(&capture(&hub), expected);
    }
    for expected in states.iter().skip(1) {
        hub.redo(&ds1).unwrap();
        assert_eq!(&capture(&hub), expected);
    }
}

#[test]
fn test_undo_remove_restores_mirror_position() {
    let mut hub = scenario();
    hub.transact(&cid("ds1"), "draw", |c| {
        c.add(EntrySpec::new("e").with_visibility(VisibilityScope::All))
    })
    .unwrap();
    let before = refs(&hub, "ds2");

    hub.transact(&cid("ds1"), "delete", |c| c.remove(&Reference::native("e0")))
        .unwrap();
    hub.undo(&cid("ds1")).unwrap();

    assert_eq!(refs(&hub, "ds2"), before);
}

#[test]
fn test_undo_past_start_fails() {
    let mut hub = scenario();
    let err = hub.undo(&cid("ds1")).unwrap_err();
    assert!(matches!(err, EngineError::IllegalState(_)));
}

#[test]
fn test_undo_remove_through_mirror_restores_origin_order() {
    let mut hub = ReplicationHub::new();
    hub.attach(container(
        "ds1",
        vec![
            EntrySpec::new("e").with_id("e0").with_visibility(VisibilityScope::All),
            EntrySpec::new("e").with_id("e1"),
            EntrySpec::new("e").with_id("e2").with_visibility(VisibilityScope::All),
        ],
    ))
    .unwrap();
    hub.attach(Container::new("ds2")).unwrap();
    let origin = refs(&hub, "ds1");
    let mirrors = refs(&hub, "ds2");
    assert_eq!(mirrors, vec![Reference::foreign("ds1", "e0"), Reference::foreign("ds1", "e2")]);

    hub.transact(&cid("ds2"), "delete", |c| c.remove(&Reference::foreign("ds1", "e2")))
        .unwrap();
    assert_eq!(refs(&hub, "ds1"), vec![Reference::native("e0"), Reference::native("e1")]);

    hub.undo(&cid("ds2")).unwrap();
    assert_eq!(refs(&hub, "ds1"), origin);
    assert_eq!(refs(&hub, "ds2"), mirrors);

    hub.redo(&cid("ds2")).unwrap();
    hub.undo(&cid("ds2")).unwrap();
    assert_eq!(refs(&hub, "ds1"), origin);
    assert_layout(hub.container(&cid("ds1")).unwrap());
}
