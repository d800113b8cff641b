//! Program-visible error kinds (§7) and the crate-wide `Result` alias.
//!
//! Grounded on `camdencheek-sqlite_rs/src/errors.rs` (`SQLiteErr`/`SQLiteResult`),
//! reworked as a `thiserror` enum so every variant carries the context needed to
//! print a useful message without the caller reconstructing it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Conflict-resolution / result-code family shared across the CORE.
///
/// These are the kinds a compiled program can report to its caller via
/// `Vdbe::step`, `Vdbe::reset`, or `Vdbe::finalize`. `Row` and `Done` are not
/// failures; they are success states callers branch on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Generic(String),

    #[error("internal logic error: {0}")]
    Internal(String),

    #[error("access permission denied for {0}")]
    Permission(String),

    #[error("callback requested abort")]
    Abort,

    #[error("database is busy")]
    Busy,

    #[error("table {0} is locked")]
    Locked(String),

    #[error("out of memory")]
    NoMem,

    #[error("attempt to write a readonly table {0}")]
    ReadOnly(String),

    #[error("interrupted")]
    Interrupt,

    #[error("disk i/o error: {0}")]
    Io(String),

    #[error("database disk image is malformed: {0}")]
    Corrupt(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database or disk is full")]
    Full,

    #[error("unable to open database file {0}")]
    CantOpen(String),

    #[error("database lock protocol error")]
    Protocol,

    #[error("empty result")]
    Empty,

    #[error("schema changed, retry required")]
    SchemaChanged,

    #[error("string or blob too big")]
    TooBig,

    #[error("constraint failed: {0}")]
    Constraint(String),

    #[error("datatype mismatch")]
    Mismatch,

    #[error("library used incorrectly: {0}")]
    Misuse(String),

    #[error("parameter or column index out of range")]
    Range,

    #[error("no row available")]
    Done,

    #[error("row available")]
    Row,

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    NoSuchTable(String),

    #[error("index {0} already exists or collides with a table name")]
    IndexExists(String),

    #[error("no such index: {0}")]
    NoSuchIndex(String),

    #[error("no such column: {0}")]
    NoSuchColumn(String),

    #[error("no such function: {0}/{1}")]
    NoSuchFunction(String, i32),

    #[error("ambiguous column name: {0}")]
    AmbiguousColumn(String),
}

impl Error {
    /// True for error actions that should still allow the parser to re-prepare
    /// the same SQL after a catalog reload (§7: "A corrupt or schema-changed
    /// indication causes the handle to evict and rebuild the in-memory catalog").
    pub fn triggers_schema_reload(&self) -> bool {
        matches!(self, Error::SchemaChanged | Error::Corrupt(_))
    }
}
