//! What survives a restart, per engine.

use tessera_core::filter::field;
use tessera_core::{CoreError, Database, EngineKind, ErrorKind, Filter, UpdateOptions};
use tessera_testkit::prelude::*;

#[test]
fn committed_writes_survive_a_restart() {
    init_tracing();
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let numbers = test_db.repository_named::<Number>("numbers").unwrap();
        numbers.insert_many(&(1..=20).map(Number::new).collect::<Vec<_>>()).unwrap();
        numbers.remove(&field("id").gt(15)).unwrap();
        numbers.upsert(&Number { id: 3, square: -1 }).unwrap();
        test_db.commit().unwrap();

        let test_db = test_db.reopen();
        let numbers = test_db.repository_named::<Number>("numbers").unwrap();
        let ids: Vec<i64> = numbers.scan().unwrap().map(|n| n.unwrap().id).collect();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>(), "{engine}");
        assert_eq!(numbers.get_by_id(3).unwrap().unwrap().square, -1);
    }
}

#[test]
fn uncommitted_writes_are_lost_on_crash() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let path = test_db.path().unwrap().to_path_buf();
        let people = test_db.collection("people").unwrap();
        people.insert(&doc([("name", "Ada")])).unwrap();
        test_db.commit().unwrap();
        people.insert(&doc([("name", "Bo")])).unwrap();

        // copy the files as they are now, as if the process died here
        let copy = tempfile::tempdir().unwrap();
        let copied = copy.path().join("copy.tdb");
        std::fs::copy(&path, &copied).unwrap();

        let db = Database::builder()
            .config(test_db.config().clone().file_path(&copied))
            .open_or_create(None)
            .unwrap();
        let names: Vec<String> = db
            .collection("people")
            .unwrap()
            .scan()
            .unwrap()
            .map(|d| d.unwrap().get_text("name").unwrap().to_string())
            .collect();
        assert_eq!(names, ["Ada"], "{engine}");
    }
}

#[test]
fn close_commits_pending_writes() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        test_db
            .collection("people")
            .unwrap()
            .insert(&doc([("name", "Ada")]))
            .unwrap();

        let test_db = test_db.reopen();
        assert_eq!(test_db.collection("people").unwrap().size().unwrap(), 1);
    }
}

#[test]
fn dropped_collections_stay_dropped() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let keep = test_db.collection("keep").unwrap();
        let gone = test_db.collection("gone").unwrap();
        keep.insert(&doc([("n", 1)])).unwrap();
        gone.insert(&doc([("n", 2)])).unwrap();
        test_db.commit().unwrap();

        gone.drop().unwrap();
        assert!(gone.is_dropped());
        let err = gone.insert(&doc([("n", 3)])).unwrap_err();
        assert!(matches!(err, CoreError::CollectionDropped { .. }));
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert!(gone.drop().is_err());

        let test_db = test_db.reopen();
        assert_eq!(test_db.list_collection_names().unwrap(), ["keep"], "{engine}");
        assert_eq!(test_db.collection("keep").unwrap().size().unwrap(), 1);
    }
}

#[test]
fn remove_all_keeps_the_collection() {
    with_each_engine(|engine, test_db| {
        let people = test_db.collection("people").unwrap();
        for name in ["Ada", "Bo", "Cy"] {
            people.insert(&doc([("name", name)])).unwrap();
        }
        assert_eq!(people.remove(&Filter::All).unwrap(), 3, "{engine}");
        assert_eq!(people.size().unwrap(), 0);
        assert!(!people.is_dropped());
        assert!(test_db.has_collection("people").unwrap());
        people.insert(&doc([("name", "Di")])).unwrap();
        assert_eq!(people.size().unwrap(), 1);
    });
}

#[test]
fn update_where_merges_into_matches() {
    with_each_engine(|engine, test_db| {
        let people = test_db.collection("people").unwrap();
        for (name, age) in [("Ada", 36), ("Bo", 19), ("Cy", 41)] {
            let mut person = doc([("name", name)]);
            person.put("age", age).unwrap();
            people.insert(&person).unwrap();
        }

        let mut patch = doc([("senior", true)]);
        patch.put("meta.reviewed", true).unwrap();
        let written = people
            .update_where(&field("age").gte(30), &patch, UpdateOptions::default())
            .unwrap();
        assert_eq!(written.count(), 2, "{engine}");

        let seniors: Vec<String> = people
            .find(field("senior").eq(true).and(field("meta.reviewed").exists()))
            .unwrap()
            .map(|d| d.unwrap().get_text("name").unwrap().to_string())
            .collect();
        assert_eq!(seniors.len(), 2);
        assert!(seniors.contains(&"Ada".to_string()));
    });
}

#[test]
fn second_writer_is_locked_out() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let err = Database::builder()
            .config(test_db.config().clone())
            .open_or_create(None)
            .unwrap_err();
        assert!(matches!(err, CoreError::StoreLocked { .. }), "{engine}");

        let dir = test_db.close();
        let reopened = dir.try_open(None).unwrap();
        assert!(!reopened.is_closed());
    }
}

#[test]
fn read_only_store_rejects_writes() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        test_db
            .collection("people")
            .unwrap()
            .insert(&doc([("name", "Ada")]))
            .unwrap();

        let test_db = test_db
            .close()
            .open_with(|config| config.read_only(true), None)
            .unwrap();
        assert!(test_db.store().is_read_only());
        let people = test_db.collection("people").unwrap();
        assert_eq!(people.size().unwrap(), 1, "{engine}");
        let err = people.insert(&doc([("name", "Bo")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert!(test_db.destroy_collection("people").is_err());
    }
}

#[test]
fn log_ignores_a_torn_tail() {
    let test_db = TestDatabase::engine(EngineKind::Log);
    let numbers = test_db.repository_named::<Number>("numbers").unwrap();
    numbers.insert(&Number::new(1)).unwrap();
    drop(numbers);
    let dir = test_db.close();
    let path = dir.path().unwrap();

    append_garbage(&path, &[0x20, 0, 0, 0, 0xde, 0xad]).unwrap();
    let test_db = dir.open_with(|config| config, None).unwrap();
    let numbers = test_db.repository_named::<Number>("numbers").unwrap();
    assert_eq!(numbers.get_by_id(1).unwrap(), Some(Number::new(1)));

    numbers.insert(&Number::new(2)).unwrap();
    let test_db = test_db.reopen();
    let numbers = test_db.repository_named::<Number>("numbers").unwrap();
    assert_eq!(numbers.size().unwrap(), 2);
}

#[test]
fn damaged_btree_snapshot_is_detected() {
    let test_db = TestDatabase::engine(EngineKind::BTree);
    test_db
        .collection("people")
        .unwrap()
        .insert(&doc([("name", "Ada")]))
        .unwrap();
    let dir = test_db.close();
    let path = dir.path().unwrap();

    flip_byte_from_end(&path, 8).unwrap();
    let err = dir.try_open(None).unwrap_err();
    assert!(matches!(err, CoreError::Corruption { .. }));
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn memory_store_starts_empty_every_time() {
    let test_db = TestDatabase::engine(EngineKind::Memory);
    test_db.collection("people").unwrap();
    let test_db = test_db.reopen();
    assert!(test_db.list_collection_names().unwrap().is_empty());
}
