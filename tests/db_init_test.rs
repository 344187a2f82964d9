use rusqlite::Connection;
use smartsync::db;

fn names(conn: &Connection, kind: &str) -> Vec<String> {
    conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
        .unwrap()
        .query_map([kind], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn full_schema_creates_all_tables_and_indexes() {
    let conn = db::open_memory_database().unwrap();

    let tables = names(&conn, "table");
    for expected in [
        "sync_metadata",
        "query_log",
        "sync_log",
        "schema_meta",
        "docs",
        "clusters",
        "items",
        "child_items",
        "context",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {expected}");
    }

    let indexes = names(&conn, "index");
    for expected in [
        "idx_sync_log_session",
        "idx_query_log_timestamp",
        "idx_docs_cluster",
        "idx_child_items_item",
        "idx_context_item",
    ] {
        assert!(indexes.contains(&expected.to_string()), "missing index {expected}");
    }
}

#[test]
fn no_triggers_on_user_tables() {
    let conn = db::open_memory_database().unwrap();
    assert!(names(&conn, "trigger").is_empty());
}

#[test]
fn sync_log_direction_is_checked() {
    let conn = db::open_memory_database().unwrap();
    let err = conn.execute(
        "INSERT INTO sync_log (session_id, direction, tables_affected, success, at) \
         VALUES ('s', 'sideways', 'docs', 1, 'x')",
        [],
    );
    assert!(err.is_err());
}

#[test]
fn query_log_rejects_negative_duration() {
    let conn = db::open_memory_database().unwrap();
    let err = conn.execute(
        "INSERT INTO query_log (query_type, tables_accessed, sync_duration_ms, query_timestamp) \
         VALUES ('q', 'docs', -1, 'x')",
        [],
    );
    assert!(err.is_err());
}
