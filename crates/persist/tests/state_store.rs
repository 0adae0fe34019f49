#![forbid(unsafe_code)]

use scalr_core::StateDoc;
use scalr_persist::{SqliteStateStore, StateStore};
use serde_json::json;

fn temp_db() -> String {
    let dir = std::env::temp_dir();
    let f = format!(
        "scalr-state-test-{}.db",
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
    );
    dir.join(f).to_string_lossy().to_string()
}

#[test]
fn documents_survive_reopen() {
    let path = temp_db();
    {
        let s = SqliteStateStore::open(&path).unwrap();
        s.put("scalr_environment", "prod", &StateDoc::from_json(0, json!({ "id": "env-1", "tag_ids": ["t1"] })))
            .unwrap();
    }
    let s = SqliteStateStore::open(&path).unwrap();
    let got = s.get("scalr_environment", "prod").unwrap().unwrap();
    assert_eq!(got.doc, StateDoc::from_json(0, json!({ "id": "env-1", "tag_ids": ["t1"] })));
    assert!(got.ts > 0);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn list_filters_by_type_and_orders_by_name() {
    let s = SqliteStateStore::open_in_memory().unwrap();
    s.put("scalr_workspace", "b", &StateDoc::from_json(5, json!({ "id": "ws-2" }))).unwrap();
    s.put("scalr_workspace", "a", &StateDoc::from_json(5, json!({ "id": "ws-1" }))).unwrap();
    s.put("scalr_environment", "prod", &StateDoc::from_json(0, json!({ "id": "env-1" }))).unwrap();

    let all = s.list(None).unwrap();
    let keys: Vec<(String, String)> = all.into_iter().map(|r| (r.type_name, r.name)).collect();
    assert_eq!(
        keys,
        vec![
            ("scalr_environment".to_string(), "prod".to_string()),
            ("scalr_workspace".to_string(), "a".to_string()),
            ("scalr_workspace".to_string(), "b".to_string()),
        ]
    );
    assert_eq!(s.list(Some("scalr_workspace")).unwrap().len(), 2);
}

#[test]
fn remove_reports_whether_a_row_existed() {
    let s = SqliteStateStore::open_in_memory().unwrap();
    s.put("scalr_workspace", "a", &StateDoc::from_json(5, json!({ "id": "ws-1" }))).unwrap();
    assert!(s.remove("scalr_workspace", "a").unwrap());
    assert!(!s.remove("scalr_workspace", "a").unwrap());
    assert!(s.get("scalr_workspace", "a").unwrap().is_none());
}
