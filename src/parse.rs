//! Parse context (§3 "Parse context"): the semantic-analysis passes that run
//! over an already-parsed [`Select`] before [`crate::compiler::Compiler`]
//! lowers it to opcodes (§4.2 passes 1-3: "resolve identifiers", "analyze
//! aggregates", "resolve function ids").
//!
//! Grounded on `camdencheek-sqlite_rs/src/parse.rs`'s `Parse` struct, which
//! the teacher uses to thread counters and an error buffer through the
//! recursive-descent parser. The parser itself is an external, non-goal
//! collaborator here (§1), so [`Resolver`] only carries the pieces of that
//! context this crate's analysis passes actually need: a cursor counter (so
//! `FROM`-term cursor numbers are assigned once, the same way the compiler's
//! own allocator would number them) and read access to the catalog and
//! function registry.

use crate::error::Result;
use crate::expr::Expr;
use crate::func::FuncRegistry;
use crate::namecontext::NameContext;
use crate::schema::Schema;
use crate::select::Select;
use crate::token_type::ExprOp;

/// Resolves raw `Column`-operator identifier tokens (`"t.x"` or `"x"`) to
/// `(cursor, column)` pairs, checks that every called function exists at the
/// call site's arity, and numbers each `FROM` term's VM cursor in the same
/// left-to-right order [`crate::compiler::Compiler::compile_select`] later
/// re-derives when it opens cursors — the two must agree, since a flattened
/// subquery's substitution keys off the cursor number assigned here.
///
/// Scalar/`EXISTS` subqueries nested in expression position are resolved in
/// their own, uncorrelated scope: this mirrors `compile_select`'s own
/// "correlated subquery materialization is not implemented" limitation, so
/// there is nothing to gain from threading an outer scope down to them yet.
pub struct Resolver<'a> {
    schema: &'a Schema,
    funcs: &'a FuncRegistry,
    next_cursor: i32,
}

impl<'a> Resolver<'a> {
    pub fn new(schema: &'a Schema, funcs: &'a FuncRegistry) -> Self {
        Resolver { schema, funcs, next_cursor: 0 }
    }

    /// Runs all three passes over `select` (and, through `UNION`/`INTERSECT`
    /// chains and subqueries, every `Select` it reaches).
    pub fn resolve(&mut self, select: &mut Select) -> Result<()> {
        for item in &mut select.from.items {
            item.cursor = self.next_cursor;
            self.next_cursor += 1;
            if let Some(sub) = &mut item.select {
                self.resolve(sub)?;
            }
        }

        let Select { from, result_columns, where_clause, having, group_by, order_by, prior, .. } = select;

        let mut nc = NameContext::new(self.schema);
        nc.push(from, true);

        for item in &mut result_columns.items {
            self.resolve_expr(&mut item.expr, &mut nc)?;
        }
        if let Some(w) = where_clause {
            self.resolve_expr(w, &mut nc)?;
        }
        if let Some(h) = having {
            self.resolve_expr(h, &mut nc)?;
        }
        if let Some(g) = group_by {
            for item in &mut g.items {
                self.resolve_expr(&mut item.expr, &mut nc)?;
            }
        }
        if let Some(o) = order_by {
            for item in &mut o.items {
                self.resolve_expr(&mut item.expr, &mut nc)?;
            }
        }
        nc.pop();

        if let Some(p) = prior {
            self.resolve(p)?;
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: &mut Expr, nc: &mut NameContext) -> Result<()> {
        if expr.op == ExprOp::Column && expr.resolved.is_none() {
            let text = expr.token.as_str();
            let resolved = match text.split_once('.') {
                Some((table, col)) => nc.resolve(Some(table), col)?,
                None => nc.resolve(None, text)?,
            };
            expr.resolved = Some(resolved);
        }
        if expr.op == ExprOp::AggFunction || expr.op == ExprOp::AggColumn {
            nc.note_aggregate_seen()?;
        }
        if expr.op == ExprOp::Function || expr.op == ExprOp::AggFunction {
            let arity = expr.list.as_ref().map(|l| l.items.len()).unwrap_or(0);
            self.funcs.find(expr.token.as_str(), arity)?;
        }
        if let Some(l) = &mut expr.left {
            self.resolve_expr(l, nc)?;
        }
        if let Some(r) = &mut expr.right {
            self.resolve_expr(r, nc)?;
        }
        if let Some(list) = &mut expr.list {
            for item in &mut list.items {
                self.resolve_expr(&mut item.expr, nc)?;
            }
        }
        if let Some(sub) = &mut expr.select {
            self.resolve(sub)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from::SrcItem;
    use crate::from::SrcList;
    use crate::table::{Column, ColumnType, Table};

    fn one_table_schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .insert_table(Table::new(
                "t",
                vec![Column::new("x", ColumnType::Integer), Column::new("y", ColumnType::Integer)],
            ))
            .unwrap();
        schema
    }

    #[test]
    fn resolves_bare_column_to_its_cursor_and_position() {
        let schema = one_table_schema();
        let funcs = FuncRegistry::new();
        let mut src = SrcList::default();
        src.items.push(SrcItem::table("t"));
        let mut select = Select::new(src);
        select.result_columns = crate::expr::ExprList::new().push(Expr::leaf(ExprOp::Column, "y"));

        Resolver::new(&schema, &funcs).resolve(&mut select).unwrap();

        assert_eq!(select.from.items[0].cursor, 0);
        let resolved = select.result_columns.items[0].expr.resolved.unwrap();
        assert_eq!(resolved.cursor, 0);
        assert_eq!(resolved.column, 1);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let schema = one_table_schema();
        let funcs = FuncRegistry::new();
        let mut src = SrcList::default();
        src.items.push(SrcItem::table("t"));
        let mut select = Select::new(src);
        select.result_columns = crate::expr::ExprList::new().push(Expr::leaf(ExprOp::Column, "z"));

        assert!(Resolver::new(&schema, &funcs).resolve(&mut select).is_err());
    }

    #[test]
    fn unknown_function_call_is_rejected() {
        let schema = one_table_schema();
        let funcs = FuncRegistry::new();
        let mut src = SrcList::default();
        src.items.push(SrcItem::table("t"));
        let mut select = Select::new(src);
        let call = Expr { list: Some(crate::expr::ExprList::new()), ..Expr::leaf(ExprOp::Function, "nope") };
        select.result_columns = crate::expr::ExprList::new().push(call);

        assert!(Resolver::new(&schema, &funcs).resolve(&mut select).is_err());
    }

    #[test]
    fn nested_from_subquery_cursors_number_depth_first() {
        let schema = one_table_schema();
        let funcs = FuncRegistry::new();
        let mut inner_src = SrcList::default();
        inner_src.items.push(SrcItem::table("t"));
        let inner = Select::new(inner_src);

        let mut outer_src = SrcList::default();
        outer_src.items.push(SrcItem::subquery(inner));
        let mut outer = Select::new(outer_src);

        Resolver::new(&schema, &funcs).resolve(&mut outer).unwrap();

        assert_eq!(outer.from.items[0].cursor, 0);
        let inner_ref = outer.from.items[0].select.as_ref().unwrap();
        assert_eq!(inner_ref.from.items[0].cursor, 1);
    }
}
