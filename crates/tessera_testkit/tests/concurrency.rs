//! Several threads sharing one database.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{CoreError, Database, StoreConfig};
use tessera_testkit::prelude::*;

const WRITERS: i64 = 4;
const PER_WRITER: i64 = 250;

/// Opens a copy of the store file as it is on disk right now.
fn snapshot_of(path: &Path, config: &StoreConfig) -> (tempfile::TempDir, Database) {
    let copy = tempfile::tempdir().unwrap();
    let copied = copy.path().join("copy.tdb");
    std::fs::copy(path, &copied).unwrap();
    let db = Database::builder()
        .config(config.clone().file_path(&copied).auto_commit(false))
        .open_or_create(None)
        .unwrap();
    (copy, db)
}

#[test]
fn commit_from_another_thread_covers_every_writer() {
    init_tracing();
    for engine in PERSISTENT_ENGINES {
        let test_db = Arc::new(TestDatabase::engine(engine));
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let test_db = Arc::clone(&test_db);
                thread::spawn(move || {
                    let numbers = test_db.repository_named::<Number>("numbers").unwrap();
                    for n in 0..PER_WRITER {
                        numbers.insert(&Number::new(writer * 1000 + n)).unwrap();
                    }
                })
            })
            .collect();
        let reader = {
            let test_db = Arc::clone(&test_db);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let numbers = test_db.repository_named::<Number>("numbers").unwrap();
                let mut last = 0;
                while !done.load(Ordering::Acquire) {
                    let size = numbers.size().unwrap();
                    assert!(size >= last, "size went from {last} to {size}");
                    last = size;
                    for number in numbers.scan().unwrap() {
                        let number = number.unwrap();
                        assert_eq!(number.square, number.id * number.id);
                    }
                }
            })
        };
        let committer = {
            let test_db = Arc::clone(&test_db);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    test_db.commit().unwrap();
                    thread::sleep(Duration::from_millis(1));
                }
                test_db.commit().unwrap();
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();
        committer.join().unwrap();

        let (_copy, db) = snapshot_of(test_db.path().unwrap(), test_db.config());
        let numbers = db.repository_named::<Number>("numbers").unwrap();
        assert_eq!(numbers.size().unwrap(), (WRITERS * PER_WRITER) as usize, "{engine}");
    }
}

#[test]
fn writes_racing_close_are_kept_or_rejected() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let people = test_db.collection("people").unwrap();

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let people = people.clone();
                thread::spawn(move || {
                    let mut written = 0usize;
                    for n in 0..PER_WRITER {
                        match people.insert(&doc([("writer", writer), ("n", n)])) {
                            Ok(_) => written += 1,
                            Err(CoreError::StoreClosed) => break,
                            Err(e) => panic!("unexpected error {e}"),
                        }
                    }
                    written
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        let closed = test_db.close();
        let written: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();

        let test_db = closed.open_with(|config| config, None).unwrap();
        let people = test_db.collection("people").unwrap();
        assert_eq!(people.size().unwrap(), written, "{engine}");
    }
}

#[test]
fn autocommit_persists_without_an_explicit_commit() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine_with(engine, |config| {
            config.auto_commit(true).auto_commit_interval_secs(1)
        });
        let path = test_db.path().unwrap().to_path_buf();
        let people = test_db.collection("people").unwrap();
        people.insert(&doc([("name", "Ada")])).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let (_copy, db) = snapshot_of(&path, test_db.config());
            let seen = db
                .has_collection("people")
                .unwrap()
                .then(|| db.collection("people").unwrap().size().unwrap())
                .unwrap_or(0);
            if seen == 1 {
                break;
            }
            assert!(Instant::now() < deadline, "{engine}: autocommit never ran");
            thread::sleep(Duration::from_millis(100));
        }

        let writer = {
            let people = people.clone();
            thread::spawn(move || {
                let mut written = 0usize;
                for n in 0..PER_WRITER {
                    match people.insert(&doc([("n", n)])) {
                        Ok(_) => written += 1,
                        Err(CoreError::StoreClosed) => break,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                    thread::sleep(Duration::from_millis(2));
                }
                written
            })
        };
        thread::sleep(Duration::from_millis(1200));
        let closed = test_db.close();
        let written = writer.join().unwrap();

        let test_db = closed.open_with(|config| config.auto_commit(false), None).unwrap();
        let people = test_db.collection("people").unwrap();
        assert_eq!(people.size().unwrap(), written + 1, "{engine}");
    }
}
