//! Fault taxonomy for the SDF pipeline.
//!
//! Orchestration code works with `anyhow::Result`; the typed variants here are
//! what callers `downcast_ref` on when they need to tell a dangling foreign key
//! from a transport failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdfError {
    // ── Remote API ───────────────────────────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },

    #[error("SDF task {task} did not finish after {attempts} status checks")]
    DeadlineExceeded { task: String, attempts: u32 },

    #[error("SDF download cancelled")]
    Cancelled,

    #[error("unexpected API response: {0}")]
    BadResponse(String),

    // ── Data integrity ───────────────────────────────────────────────────────
    #[error("dangling reference: id {id:?} not found in {table}")]
    DanglingReference { table: String, id: String },

    #[error("misaligned bulk update on {table}: {detail}")]
    MisalignedUpdate { table: String, detail: String },

    #[error("{table}: no column named {column:?} was indexed")]
    MissingColumn { table: String, column: String },

    #[error("{table}: expected header {expected:?} at column {index}, found {found:?}")]
    SchemaMismatch { table: String, index: usize, expected: String, found: String },

    // ── Operator input ───────────────────────────────────────────────────────
    #[error("cannot update SDF: {0}")]
    Precondition(String),

    #[error("invalid date {0:?} (expected YYYY-MM-DD or MM/DD/YYYY)")]
    InvalidDate(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("daily budget undefined: {0}")]
    BudgetSpan(String),

    // ── Codecs / storage ─────────────────────────────────────────────────────
    #[error("malformed CSV at line {line}: {detail}")]
    CsvParse { line: u64, detail: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("cell at {address} holds {len} chars, capacity is {capacity}")]
    CellTooLarge { address: String, len: usize, capacity: usize },

    #[error("store error: {0}")]
    Store(String),
}

impl SdfError {
    pub fn dangling(table: impl Into<String>, id: impl Into<String>) -> Self {
        SdfError::DanglingReference { table: table.into(), id: id.into() }
    }

    pub fn misaligned(table: impl Into<String>, detail: impl Into<String>) -> Self {
        SdfError::MisalignedUpdate { table: table.into(), detail: detail.into() }
    }

    /// Faults that abort the current top-level command without any local recovery.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SdfError::CellTooLarge { .. })
    }
}

impl From<reqwest::Error> for SdfError {
    fn from(e: reqwest::Error) -> Self {
        SdfError::Transport(e.to_string())
    }
}

impl From<zip::result::ZipError> for SdfError {
    fn from(e: zip::result::ZipError) -> Self {
        SdfError::Archive(e.to_string())
    }
}

impl From<csv::Error> for SdfError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        SdfError::CsvParse { line, detail: e.to_string() }
    }
}
