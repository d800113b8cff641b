//! Identifier resolution context (§4.2 pass 1: "resolve identifiers to
//! (cursor, column)").
//!
//! Grounded on `camdencheek-sqlite_rs/src/namecontext.rs`. The teacher nests
//! contexts through a raw `pNext` pointer and tags which union field
//! (`pEList`/`pAggInfo`/`pUpsert`/`iBaseReg`) is live via bitflags; here the
//! nesting is an explicit `Vec` of scopes (innermost last) searched from the
//! back, which is both the documented search order ("the inner-most context
//! is searched first") and a perfectly ordinary borrow.

use crate::error::{Error, Result};
use crate::expr::ResolvedColumn;
use crate::from::SrcList;
use crate::schema::Schema;

/// One nesting level: the FROM-clause cursor bindings visible at this scope,
/// plus whether aggregate functions are allowed here.
pub struct Scope<'a> {
    pub src: &'a SrcList,
    pub allow_agg: bool,
    pub has_agg: bool,
}

pub struct NameContext<'a> {
    schema: &'a Schema,
    /// Innermost scope last, matching the documented search order.
    scopes: Vec<Scope<'a>>,
}

impl<'a> NameContext<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        NameContext { schema, scopes: Vec::new() }
    }

    pub fn push(&mut self, src: &'a SrcList, allow_agg: bool) {
        self.scopes.push(Scope { src, allow_agg, has_agg: false });
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Resolves `table.column` (or bare `column`, searching every visible
    /// FROM term) to a `(cursor, column)` pair, walking outward through
    /// nested scopes (correlated subqueries) until a match is found.
    pub fn resolve(&self, table_alias: Option<&str>, column: &str) -> Result<ResolvedColumn> {
        for scope in self.scopes.iter().rev() {
            let mut found = None;
            for item in &scope.src.items {
                let matches_alias = match table_alias {
                    None => true,
                    Some(alias) => item
                        .alias
                        .as_deref()
                        .or(item.name.as_deref())
                        .map(|n| crate::util::strings::ident_eq(n, alias))
                        .unwrap_or(false),
                };
                if !matches_alias {
                    continue;
                }
                if let Some(name) = &item.name {
                    if let Some(table) = self.schema.find_table(name) {
                        if let Some(col_idx) = table.column_index(column) {
                            if found.is_some() {
                                return Err(Error::AmbiguousColumn(column.to_string()));
                            }
                            found = Some(ResolvedColumn { cursor: item.cursor, column: col_idx as i32 });
                        }
                    }
                }
            }
            if let Some(r) = found {
                return Ok(r);
            }
        }
        Err(Error::NoSuchColumn(column.to_string()))
    }

    /// Marks that an aggregate function was seen in the innermost scope that
    /// allows aggregates, per §4.2 pass 2.
    pub fn note_aggregate_seen(&mut self) -> Result<()> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.allow_agg {
                scope.has_agg = true;
                return Ok(());
            }
        }
        Err(Error::Generic("aggregate function used outside an aggregate context".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from::SrcItem;
    use crate::schema::Schema;
    use crate::table::{Column, ColumnType, Table};

    #[test]
    fn resolves_bare_column_against_single_from_term() {
        let mut schema = Schema::new();
        schema.insert_table(Table::new("t", vec![Column::new("x", ColumnType::Integer)])).unwrap();
        let mut src = SrcList::default();
        let mut item = SrcItem::table("t");
        item.cursor = 0;
        src.items.push(item);

        let mut nc = NameContext::new(&schema);
        nc.push(&src, false);
        let resolved = nc.resolve(None, "x").unwrap();
        assert_eq!(resolved.cursor, 0);
        assert_eq!(resolved.column, 0);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let schema = Schema::new();
        let src = SrcList::default();
        let mut nc = NameContext::new(&schema);
        nc.push(&src, false);
        assert!(nc.resolve(None, "missing").is_err());
    }
}
