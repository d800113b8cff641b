//! Operator tags reused by the expression tree (§3 "Expression node":
//! "Operator code (reused parser token)").
//!
//! The teacher reuses the lemon parser's `TK_*` token constants directly as
//! `Expr.op` (`camdencheek-sqlite_rs/src/token_type.rs`) specifically so the
//! parser and the AST cannot drift apart. The external parser this crate
//! consumes is out of scope, so there is no shared grammar source to derive
//! from automatically — instead `ExprOp` is the one closed enum both the
//! `compiler::Stmt` input type and `Expr` use, which gives the same
//! single-source-of-truth guarantee the design note in §9 asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprOp {
    // Literals / leaves
    Integer,
    Float,
    String,
    Blob,
    Null,
    Variable,
    Column,
    AggColumn,
    Asterisk,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Rem,
    UMinus,
    UPlus,

    // Bitwise
    BitAnd,
    BitOr,
    BitNot,
    LShift,
    RShift,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    IsNull,
    NotNull,

    // Logical
    And,
    Or,
    Not,

    // String / set
    Like,
    Glob,
    Match,
    Concat,
    In,
    Between,

    // Compound constructs
    Case,
    Function,
    AggFunction,
    Select,
    Exists,
    Collate,
    Cast,
}

impl ExprOp {
    /// True for the comparison family honored by §4.3's collation-aware
    /// comparison rules.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            ExprOp::Eq | ExprOp::Ne | ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge
        )
    }
}

/// One of: `TK_UNION TK_ALL TK_INTERSECT TK_EXCEPT` — the compound operator
/// linking a SELECT to its predecessor (§3 "SELECT node").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Simple,
    Union,
    UnionAll,
    Intersect,
    Except,
}
