//! Table descriptor (§3 "Table descriptor" / "Column") — C1's catalog entry.
//!
//! Grounded on `camdencheek-sqlite_rs/src/table.rs`. The teacher's
//! tri-variant union (`Table_u::{tab,view,vtab}`) keyed by `eTabType`
//! becomes a proper Rust enum (`TableKind`) carrying only the fields that
//! variant needs — the union's "which field is valid depends on a flag"
//! discipline documented by hand in the teacher is enforced by the
//! compiler here instead.

use crate::expr::ExprList;
use crate::index::Index;
use crate::select::Select;
use crate::trigger::Trigger;
use crate::util::log_est::LogEst;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Any,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub decl_type: ColumnType,
    pub default_value: Option<String>,
    pub not_null: bool,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, decl_type: ColumnType) -> Self {
        Column { name: name.into(), decl_type, default_value: None, not_null: false, primary_key: false }
    }
}

/// Conflict-resolution policy on a constraint violation (§GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Default,
    Rollback,
    Abort,
    Fail,
    Ignore,
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    /// An ordinary table, optionally with foreign-key-bearing column DEFAULTs.
    Normal,
    /// A view: queries against it expand to `select`.
    View { select: Box<Select> },
    /// A transient, VM-cursor-backed table used by subquery flattening and
    /// ephemeral result materialization (§3 invariant: "transient ⇒ root is
    /// a VM cursor number rather than a page").
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableFlags {
    pub read_only: bool,
    pub committed: bool,
    pub temp: bool,
    pub has_primary_key: bool,
}

/// Where the table's B-tree root lives: a committed page number, or — for a
/// transient table — the VM cursor that stands in for it until it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Page(u32),
    Cursor(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub check_constraints: ExprList,
    pub root: Root,
    /// `-1` when rowid is implicit, per §3.
    pub pkey_column: i32,
    pub flags: TableFlags,
    pub conflict_policy: ConflictPolicy,
    pub triggers: Vec<Trigger>,
    pub kind: TableKind,
    ref_count: u32,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let pkey_column = columns
            .iter()
            .position(|c| c.primary_key)
            .map(|i| i as i32)
            .unwrap_or(-1);
        Table {
            name: name.into(),
            columns,
            indexes: Vec::new(),
            check_constraints: ExprList::new(),
            root: Root::Cursor(-1),
            pkey_column,
            flags: TableFlags::default(),
            conflict_policy: ConflictPolicy::default(),
            triggers: Vec::new(),
            kind: TableKind::Normal,
            ref_count: 1,
        }
    }

    pub fn n_col(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| crate::util::strings::ident_eq(&c.name, name))
    }

    /// True when the rowid is itself an `INTEGER PRIMARY KEY` alias, per the
    /// invariant in §3: `column[pkey].type == INTEGER` when pkey is set.
    pub fn has_integer_rowid_alias(&self) -> bool {
        self.pkey_column >= 0
            && self.columns[self.pkey_column as usize].decl_type == ColumnType::Integer
    }

    pub fn retain(&mut self) {
        self.ref_count += 1;
    }

    /// Releases a reference; returns true once the last reference is gone,
    /// mirroring `nTabRef` in the teacher struct.
    pub fn release(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count == 0
    }
}

/// Estimated row count for query-planning purposes; kept as a `LogEst` so
/// the planner can add instead of multiply (§util/log_est.rs).
#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub row_count_est: LogEst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_primary_key_column_is_detected() {
        let t = Table::new(
            "t",
            vec![
                {
                    let mut c = Column::new("id", ColumnType::Integer);
                    c.primary_key = true;
                    c
                },
                Column::new("name", ColumnType::Text),
            ],
        );
        assert_eq!(t.pkey_column, 0);
        assert!(t.has_integer_rowid_alias());
    }

    #[test]
    fn no_primary_key_defaults_to_implicit_rowid() {
        let t = Table::new("t", vec![Column::new("name", ColumnType::Text)]);
        assert_eq!(t.pkey_column, -1);
    }
}
