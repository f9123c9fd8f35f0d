use std::fs;

use remind_core::commands::{import_reminders, load_current, run_migrate, undo};
use remind_core::config::Config;
use remind_core::datastore::DataStore;
use remind_core::{StoredReminder, WorkContextType};
use serde_json::{Value, json};
use tempfile::tempdir;

const LEGACY_FIXTURE: &str = r#"{"id":"r1","projectId":"p1","title":"buy milk","remindAt":1709307000000}
{"id":"r2","workContextId":"p2","workContextType":"PROJECT"}
{"id":"r3","projectId":"","note":"x"}
"#;

fn lines_as_json(text: &str) -> Vec<Value> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

fn config_with(key: &str, value: &str) -> Config {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(key.to_string(), value.to_string())]);
    cfg
}

#[test]
fn migrate_in_place_rewrites_legacy_rows_and_can_be_undone() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");

    let (migrated, report) = store.migrate_in_place().expect("migrate");
    assert_eq!(report.total, 3);
    assert_eq!(report.migrated, 2);
    assert_eq!(migrated.len(), 3);

    let on_disk = fs::read_to_string(&store.reminders_path).expect("read store");
    assert_eq!(
        lines_as_json(&on_disk),
        vec![
            json!({
                "id": "r1",
                "workContextId": "p1",
                "workContextType": "PROJECT",
                "title": "buy milk",
                "remindAt": 1_709_307_000_000_i64
            }),
            json!({"id": "r2", "workContextId": "p2", "workContextType": "PROJECT"}),
            json!({"id": "r3", "workContextId": "", "workContextType": "PROJECT", "note": "x"}),
        ]
    );

    let (_, second) = store.migrate_in_place().expect("migrate again");
    assert!(!second.changed());

    assert!(undo(&store).expect("undo"));
    assert!(!undo(&store).expect("undo on empty stack"));

    let restored = fs::read_to_string(&store.reminders_path).expect("read store");
    assert_eq!(lines_as_json(&restored), lines_as_json(LEGACY_FIXTURE));
}

#[test]
fn load_without_persist_leaves_file_untouched() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");

    let cfg = config_with("rc.migrate.on_load", "off");
    let reminders = load_current(&store, &cfg).expect("load current");

    assert!(reminders.iter().all(|r| r.work_context_type == Some(WorkContextType::Project)));
    assert_eq!(
        fs::read_to_string(&store.reminders_path).expect("read store"),
        LEGACY_FIXTURE
    );
    assert!(store.load_raw().expect("load raw").iter().any(StoredReminder::needs_migration));
}

#[test]
fn load_with_persist_writes_current_shape() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");

    let cfg = Config::default();
    load_current(&store, &cfg).expect("load current");

    let raw = store.load_raw().expect("load raw");
    assert_eq!(raw.len(), 3);
    assert!(!raw.iter().any(StoredReminder::needs_migration));
}

#[test]
fn import_upserts_and_migrates_incoming_rows() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");

    let input = r#"[
        {"id": "r2", "projectId": "p9", "title": "moved"},
        {"id": "r4", "workContextId": "t1", "workContextType": "TAG"}
    ]"#;
    let summary = import_reminders(&store, input).expect("import");
    assert_eq!(summary.added, 1);
    assert_eq!(summary.modified, 1);
    assert_eq!(summary.migrated, 1);

    let (reminders, report) = store.load_reminders().expect("load reminders");
    assert!(!report.changed());
    let ids: Vec<&str> = reminders.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3", "r4"]);
    assert_eq!(reminders[1].work_context_id.as_deref(), Some("p9"));
    assert_eq!(reminders[1].title(), Some("moved"));
    assert_eq!(reminders[3].work_context_type, Some(WorkContextType::Tag));

    let snapshot = store
        .pop_undo_snapshot()
        .expect("pop undo")
        .expect("snapshot");
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot[0].needs_migration());
}

#[test]
fn malformed_row_fails_with_location() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(
        &store.reminders_path,
        "{\"id\":\"ok\"}\n{\"projectId\":\"p1\",\"title\":\"no id\"}\n",
    )
    .expect("write fixture");

    let err = store.load_reminders().expect_err("row without id");
    assert!(format!("{err:#}").contains("line 2"));
}

#[test]
fn dry_run_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");
    let undo_before = fs::read(&store.undo_path).expect("read undo");

    let report = run_migrate(&store, true).expect("dry run");
    assert_eq!(report.migrated, 2);

    assert_eq!(
        fs::read_to_string(&store.reminders_path).expect("read store"),
        LEGACY_FIXTURE
    );
    assert_eq!(fs::read(&store.undo_path).expect("read undo"), undo_before);
    assert!(store.pop_undo_snapshot().expect("pop undo").is_none());

    let applied = run_migrate(&store, false).expect("migrate");
    assert_eq!(applied, report);
    assert!(!store.load_raw().expect("load raw").iter().any(StoredReminder::needs_migration));
}

#[test]
fn undo_after_import_restores_legacy_rows() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.reminders_path, LEGACY_FIXTURE).expect("write fixture");

    import_reminders(&store, r#"{"id": "r5", "projectId": "p5"}"#).expect("import");
    assert_eq!(store.load_raw().expect("load raw").len(), 4);

    assert!(undo(&store).expect("undo"));
    let restored = fs::read_to_string(&store.reminders_path).expect("read store");
    assert_eq!(lines_as_json(&restored), lines_as_json(LEGACY_FIXTURE));
}

#[test]
fn import_with_repeated_id_keeps_last_row() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let input = r#"[
        {"id": "n1", "projectId": "p1", "title": "old"},
        {"id": "n1", "projectId": "p2", "title": "new"}
    ]"#;
    let summary = import_reminders(&store, input).expect("import");
    assert_eq!(summary.added, 1);
    assert_eq!(summary.modified, 0);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.migrated, 1);

    let (reminders, _) = store.load_reminders().expect("load reminders");
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].work_context_id.as_deref(), Some("p2"));
    assert_eq!(reminders[0].title(), Some("new"));
}

#[test]
fn odd_work_context_rows_survive_migrate_in_place() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let fixture = r#"{"id":"a","workContextId":null,"workContextType":"PROJECT"}
{"id":"b","workContextId":7,"workContextType":"FOLDER"}
{"id":"c","projectId":"p1"}
"#;
    fs::write(&store.reminders_path, fixture).expect("write fixture");

    let (_, report) = store.migrate_in_place().expect("migrate");
    assert_eq!(report.migrated, 1);
    assert_eq!(report.missing_work_context, 2);

    let on_disk = lines_as_json(&fs::read_to_string(&store.reminders_path).expect("read store"));
    let expected = lines_as_json(fixture);
    assert_eq!(on_disk[..2], expected[..2]);
    assert_eq!(
        on_disk[2],
        json!({"id": "c", "workContextId": "p1", "workContextType": "PROJECT"})
    );
}
