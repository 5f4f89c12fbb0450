//! Tabular store abstraction (named, hideable tables of text cells) and the
//! in-memory implementation used by tests and by the on-disk workspace.

use crate::error::SdfError;
use crate::range::CellRange;

/// Rectangular get/set over named tables, plus table lifecycle operations.
/// Rows and columns are 1-based, matching A1 notation.
pub trait TabularStore {
    /// All tables (visible and hidden) in workspace order.
    fn table_names(&self) -> Vec<String>;
    fn has_table(&self, name: &str) -> bool;
    fn is_hidden(&self, name: &str) -> bool;

    fn create_table(&mut self, name: &str) -> Result<(), SdfError>;
    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SdfError>;
    fn hide_table(&mut self, name: &str) -> Result<(), SdfError>;
    fn delete_table(&mut self, name: &str) -> Result<(), SdfError>;
    fn clear_table(&mut self, name: &str) -> Result<(), SdfError>;

    /// The whole populated area of a table, row by row.
    fn read_table(&self, name: &str) -> Result<Vec<Vec<String>>, SdfError>;

    /// Write `values` with its top-left corner at (`row`, `col`). When any cell
    /// exceeds the store's capacity nothing is written and `CellTooLarge` is returned.
    fn write_range(&mut self, name: &str, row: usize, col: usize, values: &[Vec<String>]) -> Result<(), SdfError>;

    /// Maximum number of characters a single cell may hold.
    fn cell_capacity(&self) -> usize;

    /// Start deferring persistence of cell writes. Stores with nothing to
    /// persist ignore this.
    fn begin_batch(&mut self) {}

    /// Persist everything written since `begin_batch`.
    fn end_batch(&mut self) -> Result<(), SdfError> {
        Ok(())
    }

    fn last_row(&self, name: &str) -> Result<usize, SdfError> {
        Ok(self.read_table(name)?.len())
    }

    /// Read a rectangular range, padding missing cells with empty strings.
    fn read_range(&self, range: &CellRange) -> Result<Vec<Vec<String>>, SdfError> {
        let table = range
            .table
            .as_deref()
            .ok_or_else(|| SdfError::Store(format!("range {range} has no table name")))?;
        let rows = self.read_table(table)?;
        let mut out = Vec::with_capacity(range.rows());
        for r in range.start_row..=range.end_row {
            let src = rows.get(r - 1);
            let mut row = Vec::with_capacity(range.cols());
            for c in range.start_col..=range.end_col {
                row.push(src.and_then(|cells| cells.get(c - 1)).cloned().unwrap_or_default());
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Append one row below the last populated row and return the range written.
    fn append_row(&mut self, name: &str, values: &[String]) -> Result<CellRange, SdfError> {
        let row = self.last_row(name)? + 1;
        self.write_range(name, row, 1, &[values.to_vec()])?;
        CellRange::new(Some(name), row, 1, 1, values.len())
    }
}

#[derive(Clone, Debug)]
struct MemTable {
    name: String,
    hidden: bool,
    cells: Vec<Vec<String>>,
}

/// In-process tabular store enforcing a per-cell character capacity.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    tables: Vec<MemTable>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self { tables: Vec::new(), capacity: capacity.max(1) }
    }

    fn table(&self, name: &str) -> Result<&MemTable, SdfError> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SdfError::Store(format!("no table named {name:?}")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, SdfError> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SdfError::Store(format!("no table named {name:?}")))
    }
}

impl TabularStore for MemoryStore {
    fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name && t.hidden)
    }

    fn create_table(&mut self, name: &str) -> Result<(), SdfError> {
        if self.has_table(name) {
            return Err(SdfError::Store(format!("table {name:?} already exists")));
        }
        self.tables.push(MemTable { name: name.to_string(), hidden: false, cells: Vec::new() });
        Ok(())
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SdfError> {
        if self.has_table(to) {
            return Err(SdfError::Store(format!("table {to:?} already exists")));
        }
        self.table_mut(from)?.name = to.to_string();
        Ok(())
    }

    fn hide_table(&mut self, name: &str) -> Result<(), SdfError> {
        self.table_mut(name)?.hidden = true;
        Ok(())
    }

    fn delete_table(&mut self, name: &str) -> Result<(), SdfError> {
        let before = self.tables.len();
        self.tables.retain(|t| t.name != name);
        if self.tables.len() == before {
            return Err(SdfError::Store(format!("no table named {name:?}")));
        }
        Ok(())
    }

    fn clear_table(&mut self, name: &str) -> Result<(), SdfError> {
        self.table_mut(name)?.cells.clear();
        Ok(())
    }

    fn read_table(&self, name: &str) -> Result<Vec<Vec<String>>, SdfError> {
        Ok(self.table(name)?.cells.clone())
    }

    fn write_range(&mut self, name: &str, row: usize, col: usize, values: &[Vec<String>]) -> Result<(), SdfError> {
        if row == 0 || col == 0 {
            return Err(SdfError::Store("ranges are 1-based".into()));
        }
        let capacity = self.capacity;
        for (i, vals) in values.iter().enumerate() {
            for (j, v) in vals.iter().enumerate() {
                let len = v.chars().count();
                if len > capacity {
                    let address = CellRange::new(Some(name), row + i, col + j, 1, 1)?.to_string();
                    return Err(SdfError::CellTooLarge { address, len, capacity });
                }
            }
        }

        let t = self.table_mut(name)?;
        let width = values.iter().map(|v| col - 1 + v.len()).max().unwrap_or(0);
        for (i, vals) in values.iter().enumerate() {
            let r = row - 1 + i;
            while t.cells.len() <= r {
                t.cells.push(vec![String::new(); width.max(1)]);
            }
            let cells = &mut t.cells[r];
            if cells.len() < col - 1 + vals.len() {
                cells.resize(col - 1 + vals.len(), String::new());
            }
            for (j, v) in vals.iter().enumerate() {
                cells[col - 1 + j] = v.clone();
            }
        }
        Ok(())
    }

    fn cell_capacity(&self) -> usize {
        self.capacity
    }
}

/// Rename `name` to `name-suffix` and hide it, keeping it as an audit copy.
/// Returns the archived name, or None when no such table exists.
pub fn archive_table<S: TabularStore + ?Sized>(store: &mut S, name: &str, suffix: &str) -> Result<Option<String>, SdfError> {
    if !store.has_table(name) {
        return Ok(None);
    }
    let mut archived = format!("{name}-{suffix}");
    let mut n = 1;
    while store.has_table(&archived) {
        archived = format!("{name}-{suffix}-{n}");
        n += 1;
    }
    store.rename_table(name, &archived)?;
    store.hide_table(&archived)?;
    tracing::info!("archived existing table {name:?} as {archived:?}");
    Ok(Some(archived))
}

/// Hidden archive copies of `name`, oldest first (workspace order).
pub fn archived_copies<S: TabularStore + ?Sized>(store: &S, name: &str) -> Vec<String> {
    let prefix = format!("{name}-");
    store
        .table_names()
        .into_iter()
        .filter(|t| t.starts_with(&prefix) && store.is_hidden(t))
        .collect()
}
