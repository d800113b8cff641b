//! Schema catalog (C1, §4.1): in-memory name → descriptor maps with
//! case-insensitive, bounded lookups.
//!
//! Grounded on `camdencheek-sqlite_rs/src/schema.rs` (`Schema` holding
//! `tblHash`/`idxHash`/`trigHash`) and `hash.rs` (the generic case-folding
//! hash table backing those maps). `indexmap::IndexMap` keyed by
//! [`CiStr`](crate::util::strings::CiStr) gives the same "hash or
//! equivalent bounded lookup" contract §4.1 asks for, plus stable iteration
//! order for deterministic `sqlite_master`-style dumps.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::table::Table;
use crate::trigger::Trigger;
use crate::util::strings::CiStr;

/// A database schema version counter (§3 "schema_cookie"), compared by a
/// running program on start to detect a concurrent DDL change (§5
/// "Ordering guarantees").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaCookie(pub u32);

#[derive(Default)]
pub struct Schema {
    tables: IndexMap<CiStr, Table>,
    triggers: IndexMap<CiStr, Trigger>,
    cookie: SchemaCookie,
    /// True while replaying stored CREATE statements from the master
    /// catalog at startup — in that mode no disk writes are emitted (§4.1).
    pub init: bool,
    /// Indexes removed by DROP INDEX but not yet committed, so a rollback
    /// can restore them (§3 Index descriptor "dropped flag").
    deferred_drops: Vec<(String, Index)>,
    deferred_table_drops: Vec<(String, Table)>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn cookie(&self) -> SchemaCookie {
        self.cookie
    }

    pub fn bump_cookie(&mut self) {
        self.cookie.0 = self.cookie.0.wrapping_add(1);
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&CiStr::new(name))
    }

    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(&CiStr::new(name))
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.tables.values().flat_map(|t| &t.indexes).find(|i| crate::util::strings::ident_eq(&i.name, name))
    }

    pub fn find_trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.get(&CiStr::new(name))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn insert_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(&CiStr::new(&table.name)) {
            return Err(Error::TableExists(table.name.clone()));
        }
        if self.find_index(&table.name).is_some() {
            return Err(Error::IndexExists(table.name.clone()));
        }
        log::debug!(target: "corvid::schema", "created table {}", table.name);
        self.tables.insert(CiStr::new(&table.name), table);
        self.bump_cookie();
        Ok(())
    }

    /// Drops a table and — per §4.1 — all indexes it owns, at the catalog
    /// level. The on-disk delete of the master row and B-tree destroy are
    /// the caller's responsibility (emitted as opcodes by the compiler).
    pub fn remove_table(&mut self, name: &str) -> Result<Table> {
        let table = self
            .tables
            .shift_remove(&CiStr::new(name))
            .ok_or_else(|| Error::NoSuchTable(name.to_string()))?;
        log::debug!(
            target: "corvid::schema",
            "dropped table {} ({} owned indexes)",
            table.name,
            table.indexes.len()
        );
        self.bump_cookie();
        Ok(table)
    }

    pub fn insert_index(&mut self, index: Index) -> Result<()> {
        if self.find_index(&index.name).is_some() || self.tables.contains_key(&CiStr::new(&index.name)) {
            return Err(Error::IndexExists(index.name.clone()));
        }
        let table = self
            .find_table_mut(&index.table_name)
            .ok_or_else(|| Error::NoSuchTable(index.table_name.clone()))?;
        for &col in &index.columns {
            if col >= table.columns.len() {
                return Err(Error::NoSuchColumn(format!("column index {col}")));
            }
        }
        log::debug!(target: "corvid::schema", "created index {} on {}", index.name, index.table_name);
        table.indexes.push(index);
        self.bump_cookie();
        Ok(())
    }

    pub fn remove_index(&mut self, name: &str) -> Result<Index> {
        for table in self.tables.values_mut() {
            if let Some(pos) = table.indexes.iter().position(|i| crate::util::strings::ident_eq(&i.name, name)) {
                let mut idx = table.indexes.remove(pos);
                idx.dropped = true;
                self.deferred_drops.push((table.name.clone(), idx.clone()));
                log::debug!(target: "corvid::schema", "dropped index {}", name);
                self.bump_cookie();
                return Ok(idx);
            }
        }
        Err(Error::NoSuchIndex(name.to_string()))
    }

    /// Restores indexes and tables removed since the last commit, called on
    /// statement/transaction rollback (§7: "Rollback unwinds the whole
    /// transaction").
    pub fn rollback_drops(&mut self) {
        for (table_name, idx) in self.deferred_drops.drain(..) {
            if let Some(table) = self.tables.get_mut(&CiStr::new(&table_name)) {
                let mut idx = idx;
                idx.dropped = false;
                table.indexes.push(idx);
            }
        }
        for (_name, table) in self.deferred_table_drops.drain(..) {
            self.tables.insert(CiStr::new(&table.name), table);
        }
    }

    pub fn clear_deferred(&mut self) {
        self.deferred_drops.clear();
        self.deferred_table_drops.clear();
    }

    pub fn insert_trigger(&mut self, trigger: Trigger) -> Result<()> {
        if self.triggers.contains_key(&CiStr::new(&trigger.name)) {
            return Err(Error::Generic(format!("trigger {} already exists", trigger.name)));
        }
        if let Some(table) = self.find_table_mut(&trigger.table) {
            table.triggers.push(trigger.clone());
        }
        self.triggers.insert(CiStr::new(&trigger.name), trigger);
        self.bump_cookie();
        Ok(())
    }

    pub fn remove_trigger(&mut self, name: &str) -> Result<Trigger> {
        let trigger = self
            .triggers
            .shift_remove(&CiStr::new(name))
            .ok_or_else(|| Error::Generic(format!("no such trigger: {name}")))?;
        if let Some(table) = self.find_table_mut(&trigger.table) {
            table.triggers.retain(|t| !crate::util::strings::ident_eq(&t.name, name));
        }
        Ok(trigger)
    }

    pub fn triggers_on(&self, table: &str) -> impl Iterator<Item = &Trigger> {
        self.triggers.values().filter(move |t| crate::util::strings::ident_eq(&t.table, table))
    }
}

/// A row of the master catalog table (§6 "Master catalog table layout").
#[derive(Debug, Clone)]
pub struct MasterRow {
    pub kind: MasterKind,
    pub name: String,
    pub table_name: String,
    pub root_page: u32,
    pub sql: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterKind {
    Table,
    Index,
    Trigger,
    View,
    Meta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType};

    #[test]
    fn table_lookup_is_case_insensitive() {
        let mut schema = Schema::new();
        schema.insert_table(Table::new("Users", vec![Column::new("id", ColumnType::Integer)])).unwrap();
        assert!(schema.find_table("users").is_some());
        assert!(schema.find_table("USERS").is_some());
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let mut schema = Schema::new();
        schema.insert_table(Table::new("t", vec![])).unwrap();
        assert!(schema.insert_table(Table::new("T", vec![])).is_err());
    }

    #[test]
    fn dropping_table_also_drops_catalog_visibility_of_its_indexes() {
        let mut schema = Schema::new();
        schema.insert_table(Table::new("t", vec![Column::new("x", ColumnType::Integer)])).unwrap();
        schema.insert_index(Index::new("ix", "t", vec![0])).unwrap();
        assert!(schema.find_index("ix").is_some());
        schema.remove_table("t").unwrap();
        assert!(schema.find_index("ix").is_none());
    }

    #[test]
    fn rollback_restores_dropped_index() {
        let mut schema = Schema::new();
        schema.insert_table(Table::new("t", vec![Column::new("x", ColumnType::Integer)])).unwrap();
        schema.insert_index(Index::new("ix", "t", vec![0])).unwrap();
        schema.remove_index("ix").unwrap();
        assert!(schema.find_index("ix").is_none());
        schema.rollback_drops();
        assert!(schema.find_index("ix").is_some());
    }
}
