#[path = "common/mod.rs"]
mod common;

use sdfetl::{
    as_pointer, is_overflow_table, join_chunks, referenced_overflow_tables, resolve_rows, split_chunks, CellRange,
    MemoryStore, OverflowWriter, SdfError, TabularStore,
};

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// Splitting then joining gives back the input for a spread of lengths around
/// the limit, and no chunk is longer than the limit. Multi-byte characters
/// count as one.
#[test]
fn chunk_round_trip() {
    for len in [0usize, 1, 4, 5, 6, 10, 11, 23] {
        let s: String = "ab€d".chars().cycle().take(len).collect();
        let chunks = split_chunks(&s, 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5), "len {len}");
        assert_eq!(chunks.len(), len.div_ceil(5));
        assert_eq!(join_chunks(&chunks), s);
    }
}

/// A1 ranges format and parse symmetrically, quoting table names that need it.
#[test]
fn a1_ranges() {
    let r = CellRange::new(Some("TooBig"), 3, 1, 1, 3).unwrap();
    assert_eq!(r.to_string(), "TooBig!A3:C3");
    assert_eq!("TooBig!A3:C3".parse::<CellRange>().unwrap(), r);

    let single = CellRange::new(Some("SDF-Campaigns.csv"), 2, 28, 1, 1).unwrap();
    assert_eq!(single.to_string(), "'SDF-Campaigns.csv'!AB2");
    assert_eq!(single.to_string().parse::<CellRange>().unwrap(), single);

    assert!(as_pointer("TooBig!A1:B1", "TooBig").is_some());
    assert!(as_pointer("Other!A1:B1", "TooBig").is_none());
    assert!(as_pointer("see TooBig for details", "TooBig").is_none());
    assert!(as_pointer("'TooBig-7'!A1:B1", "TooBig").is_some());
    assert!(as_pointer("TooBigger!A1", "TooBig").is_none());
    assert!(!is_overflow_table("TooBig-", "TooBig"));

    assert!(matches!(CellRange::new(Some("T"), 0, 1, 1, 1), Err(SdfError::Store(_))));
    assert!(CellRange::new(None, 1, 0, 1, 1).is_err());
}

/// With capacity 12, a table holding one 25-char cell is written through the
/// fallback: the cell becomes `TooBig!A1:C1`, the chunks land in row 1 of the
/// overflow table, and resolving the table gives back the original rows.
#[test]
fn oversized_cell_spills_and_resolves() {
    let mut store = MemoryStore::new(12);
    store.create_table("SDF-AdGroupAds.csv").unwrap();
    let long = "x".repeat(25);
    let rows = vec![strings(&["Ad Id", "Name"]), strings(&["A1", long.as_str()]), strings(&["A2", "short"])];

    let mut writer = OverflowWriter::new("TooBig", "100");
    let report = writer.write_table(&mut store, "SDF-AdGroupAds.csv", &rows).unwrap();
    assert_eq!(report.fallback_rows, 1);
    assert_eq!(report.spilled_cells, 1);

    let stored = store.read_table("SDF-AdGroupAds.csv").unwrap();
    assert_eq!(stored[1], strings(&["A1", "TooBig!A1:C1"]));
    assert_eq!(stored[2], strings(&["A2", "short"]));
    assert_eq!(store.read_table("TooBig").unwrap(), vec![strings(&["x".repeat(12).as_str(), "x".repeat(12).as_str(), "x"])]);

    assert_eq!(resolve_rows(&store, &stored, "TooBig").unwrap(), rows);
}

/// The first spill of a writer archives a pre-existing overflow table (renamed
/// and hidden); later spills from the same writer append below earlier chunks.
#[test]
fn overflow_table_archived_once_per_writer() {
    let mut store = MemoryStore::new(12);
    store.create_table("TooBig").unwrap();
    store.write_range("TooBig", 1, 1, &[strings(&["old"])]).unwrap();
    store.create_table("T1").unwrap();
    store.create_table("T2").unwrap();

    let mut writer = OverflowWriter::new("TooBig", "7");
    writer.write_table(&mut store, "T1", &[strings(&["abcdefghijklmnopqrst"])]).unwrap();
    writer.write_table(&mut store, "T2", &[strings(&["ok", "123456789012345"])]).unwrap();

    assert!(store.is_hidden("TooBig-7"));
    assert_eq!(store.read_table("TooBig-7").unwrap(), vec![strings(&["old"])]);
    assert_eq!(store.read_table("T1").unwrap(), vec![strings(&["TooBig!A1:B1"])]);
    assert_eq!(store.read_table("T2").unwrap(), vec![strings(&["ok", "TooBig!A2:B2"])]);
    assert_eq!(
        resolve_rows(&store, &store.read_table("T2").unwrap(), "TooBig").unwrap(),
        vec![strings(&["ok", "123456789012345"])]
    );
}

/// Direct writes over capacity fail without touching the table.
#[test]
fn capacity_fault_writes_nothing() {
    let mut store = MemoryStore::new(3);
    store.create_table("T").unwrap();
    let err = store.write_range("T", 1, 1, &[strings(&["ok", "toolong"])]).unwrap_err();
    assert!(!err.is_fatal());
    match err {
        SdfError::CellTooLarge { address, len, capacity } => {
            assert_eq!(address, "T!B1");
            assert_eq!((len, capacity), (7, 3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.read_table("T").unwrap().is_empty());
}

/// Archiving the overflow table moves pointers held by tables the writer does
/// not rewrite, so they keep resolving to their old chunks while new spills
/// land in the fresh table.
#[test]
fn archiving_moves_surviving_pointers() {
    let mut store = MemoryStore::new(20);
    store.create_table("TooBig").unwrap();
    store.write_range("TooBig", 1, 1, &[strings(&["0123456789", "abc"])]).unwrap();
    store.create_table("Keep").unwrap();
    store.write_range("Keep", 1, 1, &[strings(&["id", "TooBig!A1:B1"])]).unwrap();
    store.create_table("T1").unwrap();

    let long = "y".repeat(25);
    let mut writer = OverflowWriter::new("TooBig", "7");
    writer.write_table(&mut store, "T1", &[strings(&[long.as_str()])]).unwrap();

    let kept = store.read_table("Keep").unwrap();
    assert_eq!(kept, vec![strings(&["id", "'TooBig-7'!A1:B1"])]);
    assert_eq!(resolve_rows(&store, &kept, "TooBig").unwrap(), vec![strings(&["id", "0123456789abc"])]);

    let fresh = store.read_table("T1").unwrap();
    assert_eq!(fresh, vec![strings(&["TooBig!A1:B1"])]);
    assert_eq!(resolve_rows(&store, &fresh, "TooBig").unwrap(), vec![strings(&[long.as_str()])]);

    let referenced = referenced_overflow_tables(&store, "TooBig").unwrap();
    assert!(referenced.contains("TooBig") && referenced.contains("TooBig-7"));
    assert_eq!(referenced.len(), 2);
}
