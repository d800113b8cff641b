//! Storage backend contract (§6 "Storage backend") and an in-memory
//! reference implementation good enough to drive the virtual machine and the
//! test suite.
//!
//! Grounded on `camdencheek-sqlite_rs/src/db.rs`'s `Storage`-shaped fields
//! (root pages, cursor lifecycle) and the result-code family in
//! `errors.rs`; the real paged B-tree/WAL is out of scope (§1 Non-goals), so
//! [`MemStorage`] keeps each root's rows in a sorted `BTreeMap` instead —
//! enough to expose real seek/next/prev/moveto semantics without a page
//! cache.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// What `moveto` found relative to the requested key (§6 "moveto(...) →
/// match indicator").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMatch {
    Exact,
    /// Positioned on the smallest entry greater than the key (or past the
    /// end, if none).
    Greater,
    /// No entry and none greater: cursor is invalid.
    NotFound,
}

/// A B-tree root the storage layer allocates on `create_root` and that
/// `destroy_root` later frees. Tables and indexes are both just roots; the
/// CORE never interprets the content, only key/data bytes.
pub type RootId = u32;

/// Trait contract consumed by [`crate::vdbe::Vdbe`] through its opcode
/// handlers (§6). One [`Storage`] implementation backs one open database
/// handle; it is not `Sync` — the CORE is single-threaded-per-handle (§5).
pub trait Storage {
    type Cursor: StorageCursor;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    /// Per-statement sub-transaction, nested inside the outer transaction
    /// (§4.6 "statement sub-transactions"; §7 "Abort undoes only this
    /// statement's effects").
    fn stmt_begin(&mut self) -> Result<()>;
    fn stmt_commit(&mut self) -> Result<()>;
    fn stmt_rollback(&mut self) -> Result<()>;

    fn create_root(&mut self) -> Result<RootId>;
    fn destroy_root(&mut self, root: RootId) -> Result<()>;
    fn truncate_root(&mut self, root: RootId) -> Result<()>;

    fn open_cursor(&mut self, root: RootId, writable: bool) -> Result<Self::Cursor>;
    fn close_cursor(&mut self, cursor: Self::Cursor) -> Result<()>;

    fn moveto(&self, cursor: &mut Self::Cursor, key: i64) -> Result<SeekMatch>;
    fn first(&self, cursor: &mut Self::Cursor) -> Result<bool>;
    fn last(&self, cursor: &mut Self::Cursor) -> Result<bool>;
    fn next(&self, cursor: &mut Self::Cursor) -> Result<bool>;
    fn prev(&self, cursor: &mut Self::Cursor) -> Result<bool>;

    fn insert(&mut self, cursor: &mut Self::Cursor, key: i64, data: &[u8]) -> Result<()>;
    fn delete(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    fn key(&self, cursor: &Self::Cursor) -> Result<i64>;
    fn data_size(&self, cursor: &Self::Cursor) -> Result<usize>;
    fn data(&self, cursor: &Self::Cursor) -> Result<&[u8]>;
}

/// Per-implementation cursor handle; opaque to the VM beyond what
/// [`Storage`]'s methods expose.
pub trait StorageCursor {
    fn root(&self) -> RootId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPos {
    /// Positioned on a real row.
    Valid(i64),
    /// No current row (past either end, or table empty).
    Invalid,
    /// A `moveto` was requested but the underlying seek has not run yet
    /// (§4.6 "Cursor-move deferral").
    Deferred(i64),
}

pub struct MemCursor {
    root: RootId,
    pub pos: CursorPos,
    pub writable: bool,
}

impl StorageCursor for MemCursor {
    fn root(&self) -> RootId {
        self.root
    }
}

/// In-memory reference `Storage`: one `BTreeMap<rowid, bytes>` per root,
/// with a stack of snapshots standing in for nested transactions. Not
/// durable, not concurrent — exactly what §1's Non-goals ask for.
#[derive(Default)]
pub struct MemStorage {
    roots: BTreeMap<RootId, BTreeMap<i64, Vec<u8>>>,
    next_root: RootId,
    /// Snapshot stack: `[outer_txn, stmt_txn, ...]`, restored wholesale on
    /// rollback (§4.6's contract doesn't ask for partial undo logs).
    snapshots: Vec<BTreeMap<RootId, BTreeMap<i64, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    type Cursor = MemCursor;

    fn begin(&mut self) -> Result<()> {
        self.snapshots.push(self.roots.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshots.pop();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(snap) = self.snapshots.pop() {
            self.roots = snap;
        }
        Ok(())
    }

    fn stmt_begin(&mut self) -> Result<()> {
        self.begin()
    }

    fn stmt_commit(&mut self) -> Result<()> {
        self.commit()
    }

    fn stmt_rollback(&mut self) -> Result<()> {
        self.rollback()
    }

    fn create_root(&mut self) -> Result<RootId> {
        self.next_root += 1;
        let id = self.next_root;
        self.roots.insert(id, BTreeMap::new());
        Ok(id)
    }

    fn destroy_root(&mut self, root: RootId) -> Result<()> {
        self.roots.remove(&root);
        Ok(())
    }

    fn truncate_root(&mut self, root: RootId) -> Result<()> {
        if let Some(table) = self.roots.get_mut(&root) {
            table.clear();
        }
        Ok(())
    }

    fn open_cursor(&mut self, root: RootId, writable: bool) -> Result<Self::Cursor> {
        if !self.roots.contains_key(&root) {
            return Err(Error::NotFound(format!("root {root}")));
        }
        Ok(MemCursor { root, pos: CursorPos::Invalid, writable })
    }

    fn close_cursor(&mut self, _cursor: Self::Cursor) -> Result<()> {
        Ok(())
    }

    /// Records the requested key as `Deferred` without seeking yet; the
    /// actual lookup happens lazily in [`Self::data`]/[`Self::key`], matching
    /// §4.6's cursor-move deferral and §8 scenario 4.
    fn moveto(&self, cursor: &mut Self::Cursor, key: i64) -> Result<SeekMatch> {
        cursor.pos = CursorPos::Deferred(key);
        let table = self.table(cursor.root)?;
        Ok(if table.contains_key(&key) {
            SeekMatch::Exact
        } else if table.range(key..).next().is_some() {
            SeekMatch::Greater
        } else {
            SeekMatch::NotFound
        })
    }

    fn first(&self, cursor: &mut Self::Cursor) -> Result<bool> {
        let table = self.table(cursor.root)?;
        match table.keys().next() {
            Some(&k) => {
                cursor.pos = CursorPos::Valid(k);
                Ok(true)
            }
            None => {
                cursor.pos = CursorPos::Invalid;
                Ok(false)
            }
        }
    }

    fn last(&self, cursor: &mut Self::Cursor) -> Result<bool> {
        let table = self.table(cursor.root)?;
        match table.keys().next_back() {
            Some(&k) => {
                cursor.pos = CursorPos::Valid(k);
                Ok(true)
            }
            None => {
                cursor.pos = CursorPos::Invalid;
                Ok(false)
            }
        }
    }

    fn next(&self, cursor: &mut Self::Cursor) -> Result<bool> {
        let cur = self.resolved_key(cursor)?;
        let table = self.table(cursor.root)?;
        match cur.and_then(|k| table.range((std::ops::Bound::Excluded(k), std::ops::Bound::Unbounded)).next()) {
            Some((&k, _)) => {
                cursor.pos = CursorPos::Valid(k);
                Ok(true)
            }
            None => {
                cursor.pos = CursorPos::Invalid;
                Ok(false)
            }
        }
    }

    fn prev(&self, cursor: &mut Self::Cursor) -> Result<bool> {
        let cur = self.resolved_key(cursor)?;
        let table = self.table(cursor.root)?;
        match cur.and_then(|k| table.range(..k).next_back()) {
            Some((&k, _)) => {
                cursor.pos = CursorPos::Valid(k);
                Ok(true)
            }
            None => {
                cursor.pos = CursorPos::Invalid;
                Ok(false)
            }
        }
    }

    fn insert(&mut self, cursor: &mut Self::Cursor, key: i64, data: &[u8]) -> Result<()> {
        if !cursor.writable {
            return Err(Error::ReadOnly(format!("root {}", cursor.root)));
        }
        self.table_mut(cursor.root)?.insert(key, data.to_vec());
        cursor.pos = CursorPos::Valid(key);
        Ok(())
    }

    fn delete(&mut self, cursor: &mut Self::Cursor) -> Result<()> {
        if !cursor.writable {
            return Err(Error::ReadOnly(format!("root {}", cursor.root)));
        }
        if let Some(k) = self.resolved_key(cursor)? {
            self.table_mut(cursor.root)?.remove(&k);
        }
        cursor.pos = CursorPos::Invalid;
        Ok(())
    }

    fn key(&self, cursor: &Self::Cursor) -> Result<i64> {
        self.resolved_key(cursor)?.ok_or_else(|| Error::Misuse("cursor has no current row".into()))
    }

    fn data_size(&self, cursor: &Self::Cursor) -> Result<usize> {
        Ok(self.data(cursor)?.len())
    }

    fn data(&self, cursor: &Self::Cursor) -> Result<&[u8]> {
        let k = self.resolved_key(cursor)?.ok_or_else(|| Error::Misuse("cursor has no current row".into()))?;
        self.roots
            .get(&cursor.root)
            .and_then(|t| t.get(&k))
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::NotFound(format!("rowid {k}")))
    }
}

impl MemStorage {
    fn table(&self, root: RootId) -> Result<&BTreeMap<i64, Vec<u8>>> {
        self.roots.get(&root).ok_or_else(|| Error::NotFound(format!("root {root}")))
    }

    fn table_mut(&mut self, root: RootId) -> Result<&mut BTreeMap<i64, Vec<u8>>> {
        self.roots.get_mut(&root).ok_or_else(|| Error::NotFound(format!("root {root}")))
    }

    /// Resolves a `Deferred` position by actually seeking, per §4.6: "the
    /// actual B-tree seek happens at the next read; after the seek, if the
    /// stored rowid was not present the cursor is advanced to the next
    /// greater row and rowid-is-valid is cleared [if none exists]".
    fn resolved_key(&self, cursor: &MemCursor) -> Result<Option<i64>> {
        match cursor.pos {
            CursorPos::Valid(k) => Ok(Some(k)),
            CursorPos::Invalid => Ok(None),
            CursorPos::Deferred(k) => {
                let table = self.table(cursor.root)?;
                if table.contains_key(&k) {
                    Ok(Some(k))
                } else {
                    Ok(table.range(k..).next().map(|(&k, _)| k))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_to_deferral_resolves_lazily_matches_scenario_4() {
        // §8 scenario 4: two seeks against the same cursor, each followed by
        // a read, must return the correct rows without eagerly seeking twice.
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        let mut cursor = storage.open_cursor(root, true).unwrap();
        storage.insert(&mut cursor, 5, b"five").unwrap();
        storage.insert(&mut cursor, 10, b"ten").unwrap();

        assert_eq!(storage.moveto(&mut cursor, 10).unwrap(), SeekMatch::Exact);
        assert!(matches!(cursor.pos, CursorPos::Deferred(10)));
        assert_eq!(storage.data(&cursor).unwrap(), b"ten");

        assert_eq!(storage.moveto(&mut cursor, 5).unwrap(), SeekMatch::Exact);
        assert_eq!(storage.data(&cursor).unwrap(), b"five");
    }

    #[test]
    fn moveto_missing_key_lands_on_next_greater_row() {
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        let mut cursor = storage.open_cursor(root, true).unwrap();
        storage.insert(&mut cursor, 1, b"a").unwrap();
        storage.insert(&mut cursor, 20, b"b").unwrap();

        assert_eq!(storage.moveto(&mut cursor, 10).unwrap(), SeekMatch::Greater);
        assert_eq!(storage.key(&cursor).unwrap(), 20);
    }

    #[test]
    fn rollback_restores_pre_transaction_state_matches_scenario_5() {
        // §8 scenario 5: transaction rollback must undo writes made inside it.
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        storage.begin().unwrap();
        let mut cursor = storage.open_cursor(root, true).unwrap();
        storage.insert(&mut cursor, 1, b"row").unwrap();
        assert!(storage.table(root).unwrap().contains_key(&1));

        storage.rollback().unwrap();
        assert!(!storage.roots.get(&root).map(|t| t.contains_key(&1)).unwrap_or(false));
    }

    #[test]
    fn stmt_rollback_leaves_outer_transaction_intact() {
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        storage.begin().unwrap();
        let mut cursor = storage.open_cursor(root, true).unwrap();
        storage.insert(&mut cursor, 1, b"committed").unwrap();

        storage.stmt_begin().unwrap();
        storage.insert(&mut cursor, 2, b"undone").unwrap();
        storage.stmt_rollback().unwrap();

        assert!(storage.table(root).unwrap().contains_key(&1));
        assert!(!storage.table(root).unwrap().contains_key(&2));
    }

    #[test]
    fn next_and_prev_walk_in_key_order() {
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        let mut cursor = storage.open_cursor(root, true).unwrap();
        for k in [3, 1, 2] {
            storage.insert(&mut cursor, k, b"x").unwrap();
        }
        storage.first(&mut cursor).unwrap();
        assert_eq!(storage.key(&cursor).unwrap(), 1);
        storage.next(&mut cursor).unwrap();
        assert_eq!(storage.key(&cursor).unwrap(), 2);
        storage.next(&mut cursor).unwrap();
        assert_eq!(storage.key(&cursor).unwrap(), 3);
        assert!(!storage.next(&mut cursor).unwrap());
    }
}
