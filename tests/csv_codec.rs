#[path = "common/mod.rs"]
mod common;

use common::*;
use sdfetl::{parse_csv, serialize_csv, EntityKind, SdfError};

fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
    raw.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
}

/// Serialized text uses CRLF between rows, has no trailing terminator and only
/// quotes fields that need it; parsing it gives back the same table, including
/// embedded commas, doubled quotes and line breaks.
#[test]
fn round_trip_with_awkward_fields() {
    let table = rows(&[
        &["Ad Id", "Name", "Landing Page Url"],
        &["A1", "Spring, \"Ad\"", "https://example.com/?a=1,b=2"],
        &["A2", "two\r\nlines", ""],
        &["A3", "", "plain"],
    ]);
    let text = serialize_csv(&table).unwrap();
    assert!(text.starts_with("Ad Id,Name,Landing Page Url\r\nA1,\"Spring, \"\"Ad\"\"\","));
    assert!(text.ends_with("A3,,plain"));
    assert!(!text.ends_with("\r\n"));
    assert_eq!(parse_csv(&text).unwrap(), table);
}

/// The full-width fixture tables survive the codec unchanged.
#[test]
fn fixture_tables_round_trip() {
    let s = schema();
    for (kind, table) in fixture_tables(&s) {
        let text = serialize_csv(&table).unwrap();
        assert_eq!(parse_csv(&text).unwrap(), table, "{kind:?}");
    }
    assert_eq!(fixture_table(&s, EntityKind::LineItem)[0].len(), 98);
}

/// A byte-order mark in front of the header is dropped.
#[test]
fn strips_bom() {
    let parsed = parse_csv("\u{feff}Io Id,Name\r\nI1,Spring IO").unwrap();
    assert_eq!(parsed, rows(&[&["Io Id", "Name"], &["I1", "Spring IO"]]));
}

/// An unterminated quoted field is a parse fault that names the line the quote opened on.
#[test]
fn unterminated_quote_is_fatal() {
    let err = parse_csv("Io Id,Name\r\nI1,\"Spring IO\r\nI2,Other").unwrap_err();
    match err {
        SdfError::CsvParse { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

/// Stray quotes inside an unquoted field, or text after a closing quote, are rejected too.
#[test]
fn stray_quotes_are_fatal() {
    assert!(matches!(parse_csv("a,b\r\nx\"y,z"), Err(SdfError::CsvParse { .. })));
    assert!(matches!(parse_csv("a,b\r\n\"x\"y,z"), Err(SdfError::CsvParse { .. })));
}
