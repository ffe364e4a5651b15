//! Integration tests for the database facade
//!
//! These tests drive the store through query programs end to end.

use anyhow::Result;
use entstack_core::{Config, Database, EntityStore, Populate, QueryError, StackValue};
use serde_json::json;
use std::io::Write;

const TODO_DEFS: &str = r#"
@es
["/component/title" "text"] !d +
["/component/completed" [{name: "isComplete" type: "boolean" default: false}]] !d +
drop
"#;

fn todo_db() -> Result<Database> {
    let db = Database::open();
    db.query(TODO_DEFS)?;
    db.query(
        r#"
        @es [
            {"@e" 100 "@du" "/component/title" text: "get out of bed"}
            {"@e" 100 "@du" "/component/completed" isComplete: true}
            {"@e" 101 "@du" "/component/title" text: "make coffee"}
            {"@e" 101 "@du" "/component/completed"}
        ] !c + drop
        "#,
    )?;
    Ok(db)
}

#[test]
fn test_select_completed_titles() -> Result<()> {
    let db = todo_db()?;
    let stack = db.query(
        "@es [ /component/completed#isComplete true == /component/title !bf @c ] select",
    )?;

    let items = stack.into_items();
    let [StackValue::List(results)] = items.as_slice() else {
        panic!("expected one list, got {:?}", items);
    };
    let [StackValue::Component(title)] = results.as_slice() else {
        panic!("expected one component, got {:?}", results);
    };
    assert_eq!(title.entity, 100);
    assert_eq!(title.get("text"), Some(&json!("get out of bed")));
    Ok(())
}

#[test]
fn test_defaults_fill_missing_fields() -> Result<()> {
    let db = todo_db()?;
    let stack = db.query("@es [ /component/completed#isComplete false == @eid ] select")?;
    assert_eq!(stack.items(), &[StackValue::List(vec![StackValue::from(101)])]);
    Ok(())
}

#[test]
fn test_registering_defs_twice_is_idempotent() -> Result<()> {
    let db = todo_db()?;
    db.query(TODO_DEFS)?;
    let store = db.store().read();
    assert_eq!(store.defs().len(), 2);
    assert_eq!(store.def_by_uri("/component/completed").map(|d| d.id), Some(2));
    Ok(())
}

#[test]
fn test_readding_entity_replaces_components() -> Result<()> {
    let db = todo_db()?;
    db.query(r#"@es 100 !e {"@du" "/component/title" text: "stay in bed"} !c + + drop"#)?;

    let store = db.store().read();
    let entity = store.get_entity(100, Populate::All).expect("entity 100");
    assert_eq!(entity.size(), 1);
    assert_eq!(entity.component(1).and_then(|c| c.get("text")), Some(&json!("stay in bed")));
    assert_eq!(store.changes().components.removed.len(), 1);
    Ok(())
}

#[test]
fn test_export_import_round_trip() -> Result<()> {
    let db = todo_db()?;
    let program = db.export();

    let copy = Database::open();
    copy.import(&program)?;

    let (a, b) = (db.store().read(), copy.store().read());
    assert_eq!(a.entity_count(), b.entity_count());
    for id in a.entity_ids() {
        assert_eq!(a.get_entity(id, Populate::All), b.get_entity(id, Populate::All));
    }
    Ok(())
}

#[test]
fn test_config_file_sets_loop_limit() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "query:\n  loop_limit: 25\nstore:\n  allow_def_shadowing: false")?;

    let db = Database::from_config_file(file.path())?;
    assert_eq!(db.config().query.loop_limit, 25);

    let err = db.query("[true] loop").unwrap_err();
    assert!(matches!(
        err,
        entstack_core::Error::Query(QueryError::RunawayLoop { limit: 25 })
    ));
    Ok(())
}

#[test]
fn test_shadowing_disabled_raises_conflict() -> Result<()> {
    let db = Database::with_config(Config::from_yaml("store:\n  allow_def_shadowing: false\n")?);
    db.query(r#"@es ["/component/title" "text"] !d + drop"#)?;
    let err = db
        .query(r#"@es ["/component/title" "body"] !d + drop"#)
        .unwrap_err();
    assert!(matches!(
        err,
        entstack_core::Error::Query(QueryError::SchemaConflict { ref uri, existing: 1 }) if uri == "/component/title"
    ));
    Ok(())
}

#[test]
fn test_error_rendering() {
    let db = Database::open();
    let err = db.query("1 swap").unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Invalid arguments for 'swap': no overload matches; expected one of (any any) [stack: 1]");
}

#[test]
fn test_shadowed_def_survives_round_trip() -> Result<()> {
    let db = Database::open();
    db.query(r#"@es ["/a" "x"] !d + [{"@e" 1 "@d" 1 x: 1}] !c + drop"#)?;
    db.query(r#"@es ["/a" "x" "y"] !d + [{"@e" 2 "@du" "/a" x: 2 y: 3}] !c + drop"#)?;

    let stack = db.query("@es 1 get")?;
    let [StackValue::Entity(old)] = stack.items() else {
        panic!("expected one entity, got {:?}", stack.items());
    };
    assert_eq!(old.bitfield.ids().collect::<Vec<_>>(), vec![1]);
    assert_eq!(old.component(1).and_then(|c| c.get("x")), Some(&json!(1)));

    let copy = Database::open();
    copy.import(&db.export())?;

    let (a, b) = (db.store().read(), copy.store().read());
    for id in [1, 2] {
        assert_eq!(a.get_entity(id, Populate::All), b.get_entity(id, Populate::All));
    }
    assert_eq!(b.def_by_id(1).map(|d| d.properties.len()), Some(1));
    assert_eq!(b.def_by_uri("/a").map(|d| d.id), Some(2));
    Ok(())
}

#[test]
fn test_recursive_word_is_stopped() -> Result<()> {
    let db = Database::open();
    let err = db.query("[foo] foo define foo").unwrap_err();
    assert!(matches!(
        err,
        entstack_core::Error::Query(QueryError::DepthExceeded { limit: 128 })
    ));

    db.query("1 2 +")?;
    Ok(())
}
