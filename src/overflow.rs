//! Oversized-cell handling. Values longer than the store's cell capacity are
//! cut into chunks, parked as one row of the overflow table, and replaced by an
//! A1 pointer (`TooBig!A3:C3`). Export resolves pointers back into the value.

use crate::error::SdfError;
use crate::range::CellRange;
use crate::store::{archive_table, TabularStore};
use ahash::AHashSet;

/// Split `value` into consecutive chunks of at most `limit` characters.
pub fn split(value: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut out = Vec::with_capacity(value.len() / limit + 1);
    let mut cur = String::new();
    let mut n = 0usize;
    for ch in value.chars() {
        if n == limit {
            out.push(std::mem::take(&mut cur));
            n = 0;
        }
        cur.push(ch);
        n += 1;
    }
    if n > 0 {
        out.push(cur);
    }
    out
}

pub fn join<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks.iter().map(AsRef::as_ref).collect()
}

/// `overflow_table` itself or one of its archived copies (`TooBig-<suffix>`).
pub fn is_overflow_table(name: &str, overflow_table: &str) -> bool {
    match name.strip_prefix(overflow_table) {
        Some("") => true,
        Some(rest) => rest.len() > 1 && rest.starts_with('-'),
        None => false,
    }
}

/// Parse `value` as a pointer into `overflow_table` or one of its archives.
pub fn as_pointer(value: &str, overflow_table: &str) -> Option<CellRange> {
    let v = value.trim();
    if !v.contains('!') {
        return None;
    }
    let range: CellRange = v.parse().ok()?;
    range
        .table
        .as_deref()
        .is_some_and(|t| is_overflow_table(t, overflow_table))
        .then_some(range)
}

/// Rewrite every pointer into `from` so it names `to`. Overflow tables are not
/// scanned: chunk text is never a pointer. Returns the number of cells moved.
pub fn retarget_pointers<S: TabularStore + ?Sized>(
    store: &mut S,
    overflow_table: &str,
    from: &str,
    to: &str,
) -> Result<usize, SdfError> {
    let mut moved = 0;
    for name in store.table_names() {
        if is_overflow_table(&name, overflow_table) {
            continue;
        }
        let rows = store.read_table(&name)?;
        for (i, row) in rows.iter().enumerate() {
            let mut changed = false;
            let mut out = row.clone();
            for cell in out.iter_mut() {
                let Some(mut range) = as_pointer(cell, overflow_table) else { continue };
                if range.table.as_deref() != Some(from) {
                    continue;
                }
                range.table = Some(to.to_string());
                *cell = range.to_string();
                changed = true;
                moved += 1;
            }
            if changed {
                store.write_range(&name, i + 1, 1, &[out])?;
            }
        }
    }
    Ok(moved)
}

/// Overflow tables (live or archived) that some other table still points into.
pub fn referenced_overflow_tables<S: TabularStore + ?Sized>(
    store: &S,
    overflow_table: &str,
) -> Result<AHashSet<String>, SdfError> {
    let mut out = AHashSet::new();
    for name in store.table_names() {
        if is_overflow_table(&name, overflow_table) {
            continue;
        }
        for row in store.read_table(&name)? {
            out.extend(row.iter().filter_map(|v| as_pointer(v, overflow_table)).filter_map(|r| r.table));
        }
    }
    Ok(out)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverflowReport {
    pub fallback_rows: usize,
    pub spilled_cells: usize,
}

/// Writes tables into a store, spilling oversized cells into the overflow table.
///
/// A fresh writer archives and recreates the overflow table at most once, the
/// first time a spill is needed, so pointers written by earlier tables in the
/// same download stay valid. Pointers left in tables the download does not
/// replace are moved to the archived copy. An appending writer keeps the
/// existing table and adds chunk rows below it.
pub struct OverflowWriter {
    table: String,
    archive_suffix: Option<String>,
    prepared: bool,
}

impl OverflowWriter {
    pub fn new(overflow_table: impl Into<String>, archive_suffix: impl Into<String>) -> Self {
        Self { table: overflow_table.into(), archive_suffix: Some(archive_suffix.into()), prepared: false }
    }

    pub fn appending(overflow_table: impl Into<String>) -> Self {
        Self { table: overflow_table.into(), archive_suffix: None, prepared: false }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn prepare<S: TabularStore + ?Sized>(&mut self, store: &mut S) -> Result<(), SdfError> {
        if self.prepared {
            return Ok(());
        }
        if let Some(suffix) = &self.archive_suffix {
            if let Some(archived) = archive_table(store, &self.table, suffix)? {
                let moved = retarget_pointers(store, &self.table, &self.table, &archived)?;
                if moved > 0 {
                    tracing::info!("{moved} existing pointers now name {archived:?}");
                }
            }
        }
        if !store.has_table(&self.table) {
            store.create_table(&self.table)?;
        }
        self.prepared = true;
        Ok(())
    }

    /// Write `rows` at the top of `table`. Tries one bulk write; on a capacity
    /// fault clears the table and writes row by row inside one store batch,
    /// spilling only the cells that are still too large.
    pub fn write_table<S: TabularStore + ?Sized>(
        &mut self,
        store: &mut S,
        table: &str,
        rows: &[Vec<String>],
    ) -> Result<OverflowReport, SdfError> {
        if rows.is_empty() {
            return Ok(OverflowReport::default());
        }
        match store.write_range(table, 1, 1, rows) {
            Ok(()) => return Ok(OverflowReport::default()),
            Err(SdfError::CellTooLarge { address, len, .. }) => {
                tracing::warn!("{address} holds {len} chars; writing {table:?} row by row");
            }
            Err(e) => return Err(e),
        }

        store.begin_batch();
        let result = self.write_rows(store, table, rows);
        let saved = store.end_batch();
        let report = result?;
        saved?;
        tracing::info!(
            "{table:?}: {} rows needed the fallback, {} cells spilled to {:?}",
            report.fallback_rows,
            report.spilled_cells,
            self.table
        );
        Ok(report)
    }

    fn write_rows<S: TabularStore + ?Sized>(
        &mut self,
        store: &mut S,
        table: &str,
        rows: &[Vec<String>],
    ) -> Result<OverflowReport, SdfError> {
        let mut report = OverflowReport::default();
        store.clear_table(table)?;
        self.prepare(store)?;
        let capacity = store.cell_capacity();

        for (i, row) in rows.iter().enumerate() {
            match store.write_range(table, i + 1, 1, std::slice::from_ref(row)) {
                Ok(()) => continue,
                Err(SdfError::CellTooLarge { .. }) => {}
                Err(e) => return Err(e),
            }
            report.fallback_rows += 1;
            let mut substituted = Vec::with_capacity(row.len());
            for value in row {
                if value.chars().count() <= capacity {
                    substituted.push(value.clone());
                    continue;
                }
                let chunks = split(value, capacity);
                let range = store.append_row(&self.table, &chunks)?;
                tracing::debug!("spilled {} chunks to {range}", chunks.len());
                substituted.push(range.to_string());
                report.spilled_cells += 1;
            }
            store.write_range(table, i + 1, 1, &[substituted])?;
        }
        Ok(report)
    }
}

/// Replace every pointer cell with the concatenation of the chunks it names.
/// Resolution is one level deep: chunk contents are never treated as pointers.
pub fn resolve_rows<S: TabularStore + ?Sized>(
    store: &S,
    rows: &[Vec<String>],
    overflow_table: &str,
) -> Result<Vec<Vec<String>>, SdfError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut resolved = Vec::with_capacity(row.len());
        for value in row {
            match as_pointer(value, overflow_table) {
                Some(range) => {
                    let cells = store.read_range(&range)?;
                    resolved.push(cells.iter().flatten().map(String::as_str).collect());
                }
                None => resolved.push(value.clone()),
            }
        }
        out.push(resolved);
    }
    Ok(out)
}
