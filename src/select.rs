//! SELECT node (§3 "SELECT node") and the result-row destination encoding.
//!
//! Grounded on `camdencheek-sqlite_rs/src/select.rs`. The teacher's
//! `pPrior`/`pNext` compound-select linked list (raw pointers) becomes an
//! owned `Box<Select>` chain — a compound SELECT owns its predecessor
//! outright, so there is no aliasing to worry about.

use crate::expr::{Expr, ExprList};
use crate::from::SrcList;
use crate::token_type::CompoundOp;

/// Where result rows produced by a compiled SELECT are sent (§3's
/// "result-row-destination encoding").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectDest {
    /// Stream each row to the caller via `Vdbe::step`.
    Output,
    /// Store into a single memory cell (used for scalar subqueries).
    MemCell(usize),
    /// Insert into a `RowSet`/ephemeral set (used for `IN (SELECT ...)`).
    Set,
    /// Feed into a UNION's accumulating ephemeral table.
    UnionTable(i32),
    /// Feed into an EXCEPT/INTERSECT ephemeral table.
    ExceptTable(i32),
    /// Materialize into a plain ephemeral table (flattening guard 5 etc.).
    DataTable(i32),
    /// Materialize into a transient table for a trigger-on-view rewrite
    /// (§4.5 "Triggers on views materialize the view into a temporary
    /// cursor first").
    TransientTable(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub result_columns: ExprList,
    pub from: SrcList,
    pub where_clause: Option<Box<Expr>>,
    pub group_by: Option<ExprList>,
    pub having: Option<Box<Expr>>,
    pub order_by: Option<ExprList>,
    pub compound_op: CompoundOp,
    /// The SELECT this one is UNION/INTERSECT/EXCEPT'd with, if compound.
    pub prior: Option<Box<Select>>,
    pub limit: Option<i64>,
    /// `-1` meaning unbounded, per §3.
    pub offset: i64,
    pub dest: SelectDest,
}

impl Select {
    pub fn new(from: SrcList) -> Self {
        Select {
            distinct: false,
            result_columns: ExprList::new(),
            from,
            where_clause: None,
            group_by: None,
            having: None,
            order_by: None,
            compound_op: CompoundOp::Simple,
            prior: None,
            limit: None,
            offset: -1,
            dest: SelectDest::Output,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.group_by.is_some()
            || self.result_columns.items.iter().any(|i| i.expr.contains_aggregate())
    }

    pub fn is_compound(&self) -> bool {
        self.compound_op != CompoundOp::Simple
    }

    /// True for a UNION ALL chain where every component is itself plain
    /// UNION ALL (§4.5 guard 17's "compound other than pure UNION ALL").
    pub fn is_pure_union_all(&self) -> bool {
        let mut cur = self;
        loop {
            match &cur.prior {
                None => return true,
                Some(prior) => {
                    if cur.compound_op != CompoundOp::UnionAll {
                        return false;
                    }
                    cur = prior;
                }
            }
        }
    }

    /// Number of SELECTs chained through `prior`, inclusive of `self`.
    pub fn compound_arity(&self) -> usize {
        let mut n = 1;
        let mut cur = self;
        while let Some(p) = &cur.prior {
            n += 1;
            cur = p;
        }
        n
    }

    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    pub fn has_offset(&self) -> bool {
        self.offset >= 0
    }

    pub(crate) fn substitute_cursor(&mut self, cursor: i32, replacements: &[Expr]) {
        for item in &mut self.result_columns.items {
            item.expr.substitute_cursor(cursor, replacements);
        }
        if let Some(w) = &mut self.where_clause {
            w.substitute_cursor(cursor, replacements);
        }
        if let Some(h) = &mut self.having {
            h.substitute_cursor(cursor, replacements);
        }
        if let Some(g) = &mut self.group_by {
            for item in &mut g.items {
                item.expr.substitute_cursor(cursor, replacements);
            }
        }
        if let Some(o) = &mut self.order_by {
            for item in &mut o.items {
                item.expr.substitute_cursor(cursor, replacements);
            }
        }
        for src in &mut self.from.items {
            if let Some(sub) = &mut src.select {
                sub.substitute_cursor(cursor, replacements);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from::SrcList;

    #[test]
    fn pure_union_all_chain_is_recognized() {
        let base = Select::new(SrcList::default());
        let mut middle = Select::new(SrcList::default());
        middle.compound_op = CompoundOp::UnionAll;
        middle.prior = Some(Box::new(base));
        let mut top = Select::new(SrcList::default());
        top.compound_op = CompoundOp::UnionAll;
        top.prior = Some(Box::new(middle));
        assert!(top.is_pure_union_all());
        assert_eq!(top.compound_arity(), 3);
    }

    #[test]
    fn union_breaks_pure_union_all_chain() {
        let base = Select::new(SrcList::default());
        let mut top = Select::new(SrcList::default());
        top.compound_op = CompoundOp::Union;
        top.prior = Some(Box::new(base));
        assert!(!top.is_pure_union_all());
    }
}
