use crate::error::SdfError;
use std::fmt;
use std::str::FromStr;

/// Rectangular cell range in A1 notation, optionally qualified by a table name
/// (`TooBig!A3:C3`, `'SDF-LineItems.csv'!B2`). Rows and columns are 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub table: Option<String>,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    /// `rows` and `cols` below 1 are treated as 1.
    pub fn new(table: Option<&str>, start_row: usize, start_col: usize, rows: usize, cols: usize) -> Result<Self, SdfError> {
        if start_row == 0 || start_col == 0 {
            return Err(SdfError::Store(format!("A1 ranges are 1-based, got row {start_row} col {start_col}")));
        }
        Ok(Self {
            table: table.map(str::to_string),
            start_row,
            start_col,
            end_row: start_row + rows.max(1) - 1,
            end_col: start_col + cols.max(1) - 1,
        })
    }

    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn cols(&self) -> usize {
        self.end_col - self.start_col + 1
    }
}

/// 1 -> "A", 26 -> "Z", 27 -> "AA".
pub fn column_letters(mut col: usize) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn parse_cell(s: &str) -> Option<(usize, usize)> {
    let split = s.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = s.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0usize, |acc, b| acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize))?;
    let row: usize = digits.parse().ok()?;
    if row == 0 { return None; }
    Some((row, col))
}

fn needs_quotes(table: &str) -> bool {
    !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(t) = &self.table {
            if needs_quotes(t) {
                write!(f, "'{}'!", t.replace('\'', "''"))?;
            } else {
                write!(f, "{t}!")?;
            }
        }
        write!(f, "{}{}", column_letters(self.start_col), self.start_row)?;
        if self.end_row != self.start_row || self.end_col != self.start_col {
            write!(f, ":{}{}", column_letters(self.end_col), self.end_row)?;
        }
        Ok(())
    }
}

impl FromStr for CellRange {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (table, cells) = match s.rfind('!') {
            Some(i) => {
                let raw = &s[..i];
                let name = if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
                    raw[1..raw.len() - 1].replace("''", "'")
                } else {
                    raw.to_string()
                };
                if name.is_empty() {
                    return Err("empty table name".into());
                }
                (Some(name), &s[i + 1..])
            }
            None => (None, s),
        };
        let (a, b) = match cells.split_once(':') {
            Some((a, b)) => (a, b),
            None => (cells, cells),
        };
        let (r1, c1) = parse_cell(a).ok_or_else(|| format!("invalid cell {a:?}"))?;
        let (r2, c2) = parse_cell(b).ok_or_else(|| format!("invalid cell {b:?}"))?;
        if r2 < r1 || c2 < c1 {
            return Err("range end precedes start".into());
        }
        Ok(Self { table, start_row: r1, start_col: c1, end_row: r2, end_col: c2 })
    }
}
