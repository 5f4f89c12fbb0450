//! Sub-type filter cascade: prune line items to one type, then prune IOs that
//! no longer have a surviving line item. Always line items first, IOs second.

use ahash::AHashSet;

/// Outcome of the line-item pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineItemFilter {
    /// Surviving rows, in their original relative order.
    pub kept: Vec<Vec<String>>,
    /// Parent IO ids of surviving rows, first encounter scanning from the
    /// bottom of the table, without duplicates.
    pub kept_io_ids: Vec<String>,
    pub removed: usize,
}

/// Keep line items whose `type_col` equals `target`; collect their `io_col` ids.
pub fn filter_line_items_by_subtype(rows: &[Vec<String>], type_col: usize, io_col: usize, target: &str) -> LineItemFilter {
    let mut kept_io_ids = Vec::new();
    let mut seen: AHashSet<&str> = AHashSet::new();
    let mut keep = vec![false; rows.len()];

    for (i, row) in rows.iter().enumerate().rev() {
        if cell(row, type_col) != target {
            continue;
        }
        keep[i] = true;
        let io = cell(row, io_col);
        if seen.insert(io) {
            kept_io_ids.push(io.to_string());
        }
    }

    let kept: Vec<Vec<String>> = rows
        .iter()
        .zip(keep.iter())
        .filter(|(_, k)| **k)
        .map(|(r, _)| r.clone())
        .collect();
    let removed = rows.len() - kept.len();
    LineItemFilter { kept, kept_io_ids, removed }
}

/// Keep rows whose key at `id_col` is one of `kept_ids`.
pub fn filter_by_kept_parents(rows: &[Vec<String>], id_col: usize, kept_ids: &[String]) -> Vec<Vec<String>> {
    let allow: AHashSet<&str> = kept_ids.iter().map(String::as_str).collect();
    rows.iter().filter(|r| allow.contains(cell(r, id_col))).cloned().collect()
}

#[inline]
fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}
