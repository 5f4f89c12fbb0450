//! ID-keyed lookup over a raw SDF table: id -> (header name -> value) for a
//! chosen set of columns. Iteration follows first-seen id order.

use crate::error::SdfError;
use ahash::AHashMap;

pub type Record = AHashMap<String, String>;

#[derive(Clone, Debug, Default)]
pub struct EntityIndex {
    table: String,
    order: Vec<String>,
    rows: AHashMap<String, Record>,
}

impl EntityIndex {
    /// Index `rows` (data only, no header) by the value at `id_col`,
    /// materializing only `cols`, each named by `header[idx]`.
    ///
    /// A repeated id keeps its first position and takes the later row's values.
    pub fn build(table: impl Into<String>, rows: &[Vec<String>], header: &[String], id_col: usize, cols: &[usize]) -> Self {
        let mut order = Vec::with_capacity(rows.len());
        let mut map: AHashMap<String, Record> = AHashMap::with_capacity(rows.len());
        for row in rows {
            let id = row.get(id_col).cloned().unwrap_or_default();
            let mut rec = Record::with_capacity(cols.len());
            for &idx in cols {
                let name = header.get(idx).cloned().unwrap_or_default();
                let value = row.get(idx).cloned().unwrap_or_default();
                rec.insert(name, value);
            }
            if map.insert(id.clone(), rec).is_none() {
                order.push(id);
            }
        }
        Self { table: table.into(), order, rows: map }
    }

    /// Convenience over a full table whose first row is the header.
    pub fn from_table(table: impl Into<String>, full: &[Vec<String>], id_col: usize, cols: &[usize]) -> Self {
        match full.split_first() {
            Some((header, data)) => Self::build(table, data, header, id_col, cols),
            None => Self { table: table.into(), ..Default::default() },
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Absent ids are a data-integrity fault, never a normal outcome.
    pub fn get(&self, id: &str) -> Result<&Record, SdfError> {
        self.rows.get(id).ok_or_else(|| SdfError::dangling(&self.table, id))
    }

    pub fn field(&self, id: &str, column: &str) -> Result<&str, SdfError> {
        self.get(id)?
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| SdfError::MissingColumn { table: self.table.clone(), column: column.to_string() })
    }
}
