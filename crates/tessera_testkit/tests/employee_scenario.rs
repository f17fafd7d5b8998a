//! Employees stored in a compressed on-disk collection survive a restart.

use tessera_core::filter::field;
use tessera_core::{CoreError, EngineKind, ErrorKind, Filter, Mapper};
use tessera_testkit::prelude::*;

fn run(engine: EngineKind) {
    init_tracing();
    let test_db = TestDatabase::engine_with(engine, |config| config.compress(true));
    {
        let employees = test_db.repository::<Employee>().unwrap();
        for emp_id in 1..=10 {
            employees.insert(&Employee::sample(emp_id)).unwrap();
        }
        assert_eq!(employees.size().unwrap(), 10);
    }
    test_db.commit().unwrap();

    let test_db = test_db.reopen();
    let info = test_db.store().store_info().unwrap();
    assert!(info.is_compressed());
    assert_eq!(info.engine, engine);

    let employees = test_db.repository::<Employee>().unwrap();
    let loaded: Vec<Employee> = employees
        .scan()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let expected: Vec<Employee> = (1..=10).map(Employee::sample).collect();
    assert_eq!(loaded, expected);

    let in_oslo = employees
        .find(field("address.city").eq("Oslo"))
        .unwrap()
        .count();
    assert_eq!(in_oslo, 5);

    assert_eq!(employees.remove(&Filter::All).unwrap(), 10);
    assert_eq!(employees.size().unwrap(), 0);
    assert!(!employees.is_dropped());
    assert!(test_db.has_collection("Employee").unwrap());
}

#[test]
fn btree_employee_scenario() {
    run(EngineKind::BTree);
}

#[test]
fn log_employee_scenario() {
    run(EngineKind::Log);
}

#[test]
fn recorded_compression_wins_over_reopen_config() {
    let test_db = TestDatabase::engine_with(EngineKind::BTree, |config| config.compress(true));
    test_db
        .repository::<Employee>()
        .unwrap()
        .insert(&Employee::sample(3))
        .unwrap();

    let test_db = test_db
        .close()
        .open_with(|config| config.compress(false), None)
        .unwrap();
    assert!(test_db.store().store_info().unwrap().is_compressed());
    let employee = test_db
        .repository::<Employee>()
        .unwrap()
        .get_by_id(3)
        .unwrap();
    assert_eq!(employee, Some(Employee::sample(3)));
}

#[test]
fn raw_documents_show_declared_field_order() {
    let test_db = TestDatabase::memory();
    test_db
        .repository::<Employee>()
        .unwrap()
        .insert(&Employee::sample(1))
        .unwrap();

    let raw = test_db.collection("Employee").unwrap();
    let document = raw.scan().unwrap().next().unwrap().unwrap();
    let names: Vec<&str> = document.keys().collect();
    assert_eq!(names, <Employee as tessera_core::Mappable>::fields());
    assert_eq!(document.get_text("address.city"), Some("Bergen"));
}

#[test]
fn raw_collection_cannot_duplicate_an_employee() {
    for engine in PERSISTENT_ENGINES {
        let test_db = TestDatabase::engine(engine);
        let employees = test_db.repository::<Employee>().unwrap();
        employees.insert(&Employee::sample(1)).unwrap();

        let document = Mapper::default().write(&Employee::sample(1)).unwrap();
        let raw = test_db.collection("Employee").unwrap();
        let err = raw.insert(&document).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        test_db.commit().unwrap();

        let test_db = test_db.reopen();
        let employees = test_db.repository::<Employee>().unwrap();
        assert_eq!(employees.find(field("emp_id").eq(1)).unwrap().count(), 1);
        let err = test_db.repository_named::<Note>("Employee").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }
}
