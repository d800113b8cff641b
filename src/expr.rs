//! Expression & AST model (C2): the immutable-after-analysis expression tree
//! (§4.2).
//!
//! Grounded on `camdencheek-sqlite_rs/src/expr.rs` (`Expr`/`ExprList`). The
//! teacher's owning raw pointers (`pLeft`, `pRight`, `pList`, `pSelect`) and
//! manual recursive-free discipline become `Box`/`Vec` ownership — Rust's
//! drop glue already recurses correctly, so there is nothing left to get
//! wrong by forgetting a free. Cloning a tree (needed to copy a trigger body
//! into each firing site, §4.8) is `#[derive(Clone)]`; the teacher's
//! "move strings by offset" trick for relocating token text into one arena
//! is unnecessary once `Token` owns its text (see `token.rs`).

use crate::select::Select;
use crate::token::Token;
use crate::token_type::ExprOp;

/// One node of an expression tree (§3 "Expression node").
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub op: ExprOp,
    pub left: Option<Box<Expr>>,
    pub right: Option<Box<Expr>>,
    /// Function/IN-list arguments, or CASE branch operands.
    pub list: Option<ExprList>,
    /// A correlated subquery, for `Select`/`Exists`/`In` with a SELECT body.
    pub select: Option<Box<Select>>,
    /// Literal text, identifier name, or function name.
    pub token: Token,
    /// The full source span, used to synthesize result-column titles.
    pub span: Token,
    /// Resolved (cursor, column) once name resolution (§4.2 pass 1) has run.
    pub resolved: Option<ResolvedColumn>,
    /// Resolved function id once §4.2 pass 3 has run.
    pub func_id: Option<String>,
    /// Slot index into the parse context's aggregate array, set by §4.2 pass 2.
    pub agg_slot: Option<usize>,
}

/// Where a `Column`-operator `Expr` ultimately points, once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub cursor: i32,
    pub column: i32,
}

impl Expr {
    pub fn leaf(op: ExprOp, token: impl Into<Token>) -> Self {
        Expr {
            op,
            left: None,
            right: None,
            list: None,
            select: None,
            token: token.into(),
            span: Token::default(),
            resolved: None,
            func_id: None,
            agg_slot: None,
        }
    }

    pub fn binary(op: ExprOp, left: Expr, right: Expr) -> Self {
        Expr { left: Some(Box::new(left)), right: Some(Box::new(right)), ..Expr::leaf(op, "") }
    }

    pub fn unary(op: ExprOp, operand: Expr) -> Self {
        Expr { left: Some(Box::new(operand)), ..Expr::leaf(op, "") }
    }

    pub fn column(cursor: i32, column: i32) -> Self {
        Expr { resolved: Some(ResolvedColumn { cursor, column }), ..Expr::leaf(ExprOp::Column, "") }
    }

    pub fn null() -> Self {
        Expr::leaf(ExprOp::Null, "")
    }

    pub fn is_aggregate(&self) -> bool {
        self.op == ExprOp::AggFunction || self.op == ExprOp::AggColumn
    }

    /// Walks the subtree looking for any aggregate function reference — used
    /// by the flattener guards that ask "does P/S aggregate" (§4.5).
    pub fn contains_aggregate(&self) -> bool {
        if self.is_aggregate() {
            return true;
        }
        self.left.as_deref().map(Expr::contains_aggregate).unwrap_or(false)
            || self.right.as_deref().map(Expr::contains_aggregate).unwrap_or(false)
            || self.list.as_ref().map(|l| l.items.iter().any(|i| i.expr.contains_aggregate())).unwrap_or(false)
    }

    /// Recursively substitutes every `Column` reference bound to `cursor`
    /// with the corresponding result expression from `replacements`,
    /// including into nested SELECTs — step (c) of flattening (§4.5).
    pub fn substitute_cursor(&mut self, cursor: i32, replacements: &[Expr]) {
        if self.op == ExprOp::Column {
            if let Some(r) = self.resolved {
                if r.cursor == cursor {
                    if let Some(repl) = replacements.get(r.column as usize) {
                        *self = repl.clone();
                    }
                    return;
                }
            }
        }
        if let Some(l) = &mut self.left {
            l.substitute_cursor(cursor, replacements);
        }
        if let Some(r) = &mut self.right {
            r.substitute_cursor(cursor, replacements);
        }
        if let Some(list) = &mut self.list {
            for item in &mut list.items {
                item.expr.substitute_cursor(cursor, replacements);
            }
        }
        if let Some(sel) = &mut self.select {
            sel.substitute_cursor(cursor, replacements);
        }
    }
}

/// One entry of an [`ExprList`] (§3 "Expression list").
#[derive(Debug, Clone, PartialEq)]
pub struct ExprListItem {
    pub expr: Expr,
    /// `AS <name>` result alias, if any.
    pub alias: Option<String>,
    /// Sort direction for ORDER BY entries: `false` = ASC.
    pub sort_desc: bool,
    pub is_aggregate_marker: bool,
    /// Set by analysis passes once this entry has been fully processed.
    pub done: bool,
}

impl From<Expr> for ExprListItem {
    fn from(expr: Expr) -> Self {
        ExprListItem { expr, alias: None, sort_desc: false, is_aggregate_marker: false, done: false }
    }
}

/// An ordered list of expressions: SELECT result columns, function
/// arguments, GROUP BY/ORDER BY terms, or an `IN (...)` constant list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprList {
    pub items: Vec<ExprListItem>,
}

impl ExprList {
    pub fn new() -> Self {
        ExprList::default()
    }

    pub fn push(mut self, expr: Expr) -> Self {
        self.items.push(expr.into());
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One entry of an [`IdList`]: an identifier with an optional alias and
/// resolved table back-reference (§3 "Expression list / identifier list").
#[derive(Debug, Clone, Default)]
pub struct IdListItem {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IdList {
    pub items: Vec<IdListItem>,
}

impl IdList {
    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|i| crate::util::strings::ident_eq(&i.name, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_aggregate_finds_nested_agg_function() {
        let inner = Expr::leaf(ExprOp::AggFunction, "count");
        let outer = Expr::unary(ExprOp::UMinus, inner);
        assert!(outer.contains_aggregate());
    }

    #[test]
    fn substitute_cursor_replaces_matching_column_refs() {
        let mut expr = Expr::column(5, 1);
        let replacements = vec![Expr::leaf(ExprOp::Integer, "0"), Expr::leaf(ExprOp::Integer, "99")];
        expr.substitute_cursor(5, &replacements);
        assert_eq!(expr.token.as_str(), "99");
    }
}
