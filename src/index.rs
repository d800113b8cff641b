//! Index descriptor (§3 "Index descriptor").
//!
//! Grounded on `camdencheek-sqlite_rs/src/index.rs`. The teacher's
//! `pTable: *mut Table` back-reference is a deliberately borrowed (never
//! owning) pointer; here it becomes the table's name, looked up through the
//! schema catalog on demand — avoiding a self-referential struct while
//! keeping the "never owns" contract explicit.

use crate::record::KeyInfo;
use crate::table::ConflictPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    /// Column positions (into the owning table) that make up this index,
    /// in key order.
    pub columns: Vec<usize>,
    pub descending: Vec<bool>,
    pub root: crate::table::Root,
    pub unique: bool,
    pub on_conflict: ConflictPolicy,
    /// Set when the index is dropped but rollback may still need to restore
    /// it (§3 "dropped flag used for deferred removal across rollback").
    pub dropped: bool,
}

impl Index {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>, columns: Vec<usize>) -> Self {
        let n = columns.len();
        Index {
            name: name.into(),
            table_name: table_name.into(),
            columns,
            descending: vec![false; n],
            root: crate::table::Root::Cursor(-1),
            unique: false,
            on_conflict: ConflictPolicy::Abort,
            dropped: false,
        }
    }

    pub fn key_info(&self) -> KeyInfo {
        KeyInfo {
            collations: vec![None; self.columns.len()],
            descending: self.descending.clone(),
        }
    }
}
