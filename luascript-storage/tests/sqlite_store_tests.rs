use luascript_storage::{KeyValueStore, SqliteStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn store() -> SqliteStore {
    SqliteStore::open_in_memory("https://example.test").unwrap()
}

// ── Basic CRUD ───────────────────────────────────────────────────

#[test]
fn get_unset_key_returns_none() {
    assert_eq!(store().get("never-set").unwrap(), None);
}

#[test]
fn set_then_get() {
    let s = store();
    s.set("theme", "dark").unwrap();
    assert_eq!(s.get("theme").unwrap().as_deref(), Some("dark"));
}

#[test]
fn set_overwrites_existing_value() {
    let s = store();
    s.set("count", "1").unwrap();
    s.set("count", "2").unwrap();
    assert_eq!(s.get("count").unwrap().as_deref(), Some("2"));
    assert_eq!(s.keys().unwrap(), vec!["count"]);
}

#[test]
fn remove_reports_presence() {
    let s = store();
    s.set("k", "v").unwrap();
    assert!(s.remove("k").unwrap());
    assert!(!s.remove("k").unwrap());
    assert_eq!(s.get("k").unwrap(), None);
}

#[test]
fn clear_and_keys() {
    let s = store();
    s.set("b", "2").unwrap();
    s.set("a", "1").unwrap();
    assert_eq!(s.keys().unwrap(), vec!["a", "b"]);
    s.clear().unwrap();
    assert!(s.keys().unwrap().is_empty());
}

// ── Namespaces & persistence ─────────────────────────────────────

#[test]
fn namespaces_are_isolated_in_one_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kv.db");

    let a = SqliteStore::open(&path, "site-a").unwrap();
    let b = SqliteStore::open(&path, "site-b").unwrap();
    a.set("token", "alpha").unwrap();

    assert_eq!(b.get("token").unwrap(), None);
    b.clear().unwrap();
    assert_eq!(a.get("token").unwrap().as_deref(), Some("alpha"));
    assert_eq!(a.namespace(), "site-a");
}

#[test]
fn values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("kv.db");
    {
        let s = SqliteStore::open(&path, "ns").unwrap();
        s.set("persisted", "yes").unwrap();
    }
    let s = SqliteStore::open(&path, "ns").unwrap();
    assert_eq!(s.get("persisted").unwrap().as_deref(), Some("yes"));
}
