use digest_sheets::UpsertOutcome;
use pretty_assertions::assert_eq;

mod common;

use common::{row, status_header, Harness, STORE_ID};

#[test]
fn existing_keys_are_updated_in_place_and_new_keys_appended() {
    let h = Harness::new();
    h.sheets.add_table(
        STORE_ID,
        "ReadStatus",
        vec![status_header(), row(&["http://a", "true"])],
    );

    let outcome = h.store.upsert(STORE_ID, "http://b", false).expect("append b");
    assert_eq!(outcome, UpsertOutcome::Appended);
    let outcome = h.store.upsert(STORE_ID, "http://a", false).expect("update a");
    assert_eq!(outcome, UpsertOutcome::Updated { row: 2 });

    assert_eq!(
        h.values("ReadStatus"),
        vec![
            status_header(),
            row(&["http://a", "false"]),
            row(&["http://b", "false"]),
        ]
    );
    let calls = h.sheets.calls();
    assert_eq!(calls.append_row, 1);
    assert_eq!(calls.write_cell, 1);
}

#[test]
fn toggling_two_items_from_an_empty_table() {
    let h = Harness::new();
    h.sheets.add_table(STORE_ID, "ReadStatus", vec![status_header()]);

    h.store.upsert(STORE_ID, "a", true).expect("a read");
    assert_eq!(h.values("ReadStatus"), vec![status_header(), row(&["a", "true"])]);

    h.store.upsert(STORE_ID, "b", false).expect("b unread");
    assert_eq!(
        h.values("ReadStatus"),
        vec![status_header(), row(&["a", "true"]), row(&["b", "false"])]
    );

    h.store.upsert(STORE_ID, "a", false).expect("a unread");
    assert_eq!(
        h.values("ReadStatus"),
        vec![status_header(), row(&["a", "false"]), row(&["b", "false"])]
    );
}

#[test]
fn missing_status_table_is_created_with_headers() {
    let h = Harness::new();

    let outcome = h.store.upsert(STORE_ID, "http://x", true).expect("upsert");

    assert_eq!(outcome, UpsertOutcome::Appended);
    assert_eq!(
        h.values("ReadStatus"),
        vec![status_header(), row(&["http://x", "true"])]
    );
}

#[test]
fn status_table_first_created_by_a_read_gets_its_header_on_the_first_upsert() {
    let h = Harness::new();

    let snapshot = h.store.load_table(STORE_ID, "ReadStatus").expect("read creates table");
    assert!(snapshot.header().is_empty());
    assert!(h.values("ReadStatus").is_empty());

    assert_eq!(
        h.store.upsert(STORE_ID, "a", true).expect("a read"),
        UpsertOutcome::Appended
    );
    assert_eq!(h.values("ReadStatus"), vec![status_header(), row(&["a", "true"])]);

    assert_eq!(
        h.store.upsert(STORE_ID, "b", false).expect("b unread"),
        UpsertOutcome::Appended
    );
    assert_eq!(
        h.store.upsert(STORE_ID, "a", false).expect("a unread"),
        UpsertOutcome::Updated { row: 2 }
    );
    assert_eq!(
        h.values("ReadStatus"),
        vec![status_header(), row(&["a", "false"]), row(&["b", "false"])]
    );

    let reread = h.store.load_table(STORE_ID, "ReadStatus").expect("reread");
    assert_eq!(reread.header(), status_header().as_slice());
    assert_eq!(reread.len(), 2);
}

#[test]
fn upserts_read_the_store_directly_and_invalidate_the_cache() {
    let h = Harness::new();
    h.sheets.add_table(
        STORE_ID,
        "ReadStatus",
        vec![status_header(), row(&["http://a", "false"])],
    );
    h.sheets.add_table(STORE_ID, "Articles", vec![row(&["URL"]), row(&["http://a"])]);

    let before = h.store.load_table(STORE_ID, "ReadStatus").expect("warm status");
    h.store.load_table(STORE_ID, "Articles").expect("warm articles");
    assert_eq!(h.store.cache().len(), 2);

    h.store.upsert(STORE_ID, "http://a", true).expect("upsert");
    // The cached snapshot was not consulted: the upsert did its own read.
    assert_eq!(h.sheets.calls().read_all_values, 3);
    assert!(h.store.cache().is_empty());

    // No clock movement needed for the change to show up.
    let after = h.store.load_table(STORE_ID, "ReadStatus").expect("reread");
    assert_eq!(before.rows(), &[row(&["http://a", "false"])][..]);
    assert_eq!(after.rows(), &[row(&["http://a", "true"])][..]);
}

#[test]
fn duplicate_keys_resolve_to_the_last_row() {
    let h = Harness::new();
    h.sheets.add_table(
        STORE_ID,
        "ReadStatus",
        vec![
            status_header(),
            row(&["http://a", "true"]),
            row(&["http://b", "false"]),
            row(&["http://a", "true"]),
        ],
    );

    let outcome = h.store.upsert(STORE_ID, "http://a", false).expect("upsert");

    assert_eq!(outcome, UpsertOutcome::Updated { row: 4 });
    assert_eq!(
        h.values("ReadStatus"),
        vec![
            status_header(),
            row(&["http://a", "true"]),
            row(&["http://b", "false"]),
            row(&["http://a", "false"]),
        ]
    );
}

#[test]
fn failed_writes_leave_the_cache_alone() {
    use digest_sheets::memory::Operation;
    use digest_sheets::{ApiError, DataError};

    let h = Harness::new();
    h.sheets.add_table(
        STORE_ID,
        "ReadStatus",
        vec![status_header(), row(&["http://a", "false"])],
    );
    h.store.load_table(STORE_ID, "ReadStatus").expect("warm status");
    h.sheets
        .fail_next(Operation::WriteCell, ApiError::http(400, "Invalid range"));

    let err = h.store.upsert(STORE_ID, "http://a", true).unwrap_err();

    assert!(matches!(err, DataError::PermanentRemote(_)), "{err:?}");
    assert_eq!(h.store.cache().len(), 1);
    assert_eq!(
        h.values("ReadStatus"),
        vec![status_header(), row(&["http://a", "false"])]
    );
}
