//! CSV codec for SDF files: strict parsing and CRLF serialization without a
//! trailing terminator.

use crate::error::SdfError;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

/// Parse CSV text into rows of fields. The first row is the header.
///
/// Quoted fields may contain separators, quotes (doubled) and line breaks.
/// Malformed quoting is rejected before the `csv` reader sees the input,
/// because the reader itself is lenient about stray quotes.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>, SdfError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    validate_quoting(text)?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        rows.push(rec.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Serialize rows with `,` separators and `\r\n` between rows (none after the last).
/// Fields containing a separator, quote or line break are double-quoted.
pub fn serialize(rows: &[Vec<String>]) -> Result<String, SdfError> {
    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .quote_style(QuoteStyle::Necessary)
        .flexible(true)
        .from_writer(Vec::with_capacity(rows.len() * 64));
    for row in rows {
        wtr.write_record(row)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| SdfError::Store(format!("csv flush: {}", e.error())))?;
    let mut out = String::from_utf8(bytes).map_err(|e| SdfError::Store(e.to_string()))?;
    if out.ends_with("\r\n") {
        out.truncate(out.len() - 2);
    }
    Ok(out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quoting {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

fn validate_quoting(text: &str) -> Result<(), SdfError> {
    let mut state = Quoting::FieldStart;
    let mut line: u64 = 1;
    let mut quote_line: u64 = 1;
    let bad = |line: u64, detail: &str| SdfError::CsvParse { line, detail: detail.to_string() };

    for ch in text.chars() {
        state = match (state, ch) {
            (Quoting::Quoted, '"') => Quoting::QuoteInQuoted,
            (Quoting::Quoted, _) => Quoting::Quoted,
            (Quoting::QuoteInQuoted, '"') => Quoting::Quoted,
            (Quoting::QuoteInQuoted, ',' | '\r' | '\n') => Quoting::FieldStart,
            (Quoting::QuoteInQuoted, _) => return Err(bad(line, "unexpected character after closing quote")),
            (Quoting::FieldStart, '"') => {
                quote_line = line;
                Quoting::Quoted
            }
            (Quoting::FieldStart | Quoting::Unquoted, ',' | '\r' | '\n') => Quoting::FieldStart,
            (Quoting::Unquoted, '"') => return Err(bad(line, "quote inside unquoted field")),
            (Quoting::FieldStart | Quoting::Unquoted, _) => Quoting::Unquoted,
        };
        if ch == '\n' {
            line += 1;
        }
    }
    if state == Quoting::Quoted {
        return Err(bad(quote_line, "unterminated quoted field"));
    }
    Ok(())
}
