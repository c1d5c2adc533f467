use rusqlite::Connection;

use gridsweep::selection::{IdentifierTuple, MaterializedSelection};

fn tuples(n: usize) -> Vec<IdentifierTuple> {
    (0..n)
        .map(|i| IdentifierTuple::new(vec![format!("k{i}"), format!("{i}")]))
        .collect()
}

#[test]
fn one_aligned_entry_per_tuple() {
    let conn = Connection::open_in_memory().expect("db");
    let input = tuples(7);
    let store = MaterializedSelection::materialize(&conn, &input, 2).expect("materialize ok");
    assert_eq!(store.len(), 7);
    let entries = store.entries(&conn).expect("read back");
    assert_eq!(entries, input, "entries must be column-aligned with the input");
    store.discard(&conn);
}

#[test]
fn short_tuples_pad_to_the_declared_width() {
    let conn = Connection::open_in_memory().expect("db");
    let input = vec![
        IdentifierTuple::new(vec!["a".to_string(), "1".to_string()]),
        IdentifierTuple::single("b"),
    ];
    let store = MaterializedSelection::materialize(&conn, &input, 2).expect("materialize ok");
    let padded: i64 = conn
        .query_row(
            &format!("select count(*) from {} where key_2 is null", store.table()),
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(padded, 1, "the short tuple pads its missing column with null");
    let entries = store.entries(&conn).expect("read back");
    assert_eq!(entries, input, "read-back restores the original column counts");
    store.discard(&conn);
}

#[test]
fn zero_declared_identifier_columns_is_a_config_error() {
    let conn = Connection::open_in_memory().expect("db");
    let err = MaterializedSelection::materialize(&conn, &tuples(1), 0).unwrap_err();
    assert!(
        format!("{err}").contains("identifier columns"),
        "unexpected error: {err}"
    );
}

#[test]
fn discard_drops_the_store() {
    let conn = Connection::open_in_memory().expect("db");
    let store = MaterializedSelection::materialize(&conn, &tuples(3), 2).expect("materialize ok");
    let name = store.table().to_string();
    store.discard(&conn);
    let remaining: i64 = conn
        .query_row(
            "select count(*) from sqlite_temp_master where type = 'table' and name = ?1",
            [&name],
            |r| r.get(0),
        )
        .expect("catalog");
    assert_eq!(remaining, 0, "the temp table must be gone after discard");
}
