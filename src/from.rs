//! FROM-clause model (`SrcList`/`SrcItem`, §3 "SELECT node" / §4.5 flattening).
//!
//! Grounded on `camdencheek-sqlite_rs/src/from.rs`. The teacher packs join
//! metadata into bitfields and three anonymous unions keyed by feature
//! flags (`fg.isIndexedBy`, `fg.isCte`, ...); here that collapses into two
//! small enums (`IndexHint`, `JoinConstraint`) so invalid combinations (e.g.
//! both an `INDEXED BY` clause and table-function args) are unrepresentable
//! rather than merely undocumented.

use bitflags::bitflags;

use crate::expr::{Expr, IdList};
use crate::select::Select;

bitflags! {
    /// Permitted values of a join's type, matching `JT` in the teacher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JoinType: u8 {
        const INNER   = 0x01;
        const CROSS   = 0x02;
        const NATURAL = 0x04;
        const LEFT    = 0x08;
        const RIGHT   = 0x10;
        const OUTER   = 0x20;
    }
}

/// Either an `ON` expression or a `USING` column list for a join — never
/// both (§ teacher doc comment on `OnOrUsing`).
#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    None,
    On(Box<Expr>),
    Using(IdList),
}

/// `INDEXED BY <name>` / `NOT INDEXED` hint on a FROM term.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum IndexHint {
    #[default]
    None,
    NotIndexed,
    IndexedBy(String),
}

/// One term of a FROM clause: a table reference or a subquery, with its join
/// relationship to the previous term.
#[derive(Debug, Clone, PartialEq)]
pub struct SrcItem {
    pub database: Option<String>,
    pub name: Option<String>,
    pub alias: Option<String>,
    /// A SELECT used in place of a table name — the subquery the flattener
    /// (§4.5) may absorb into the enclosing query.
    pub select: Option<Box<Select>>,
    pub join_type: JoinType,
    pub constraint: JoinConstraint,
    pub index_hint: IndexHint,
    /// The VDBE cursor number bound to this FROM term once compiled.
    pub cursor: i32,
    pub is_cte: bool,
    pub is_recursive: bool,
    pub correlated: bool,
}

impl SrcItem {
    pub fn table(name: impl Into<String>) -> Self {
        SrcItem {
            database: None,
            name: Some(name.into()),
            alias: None,
            select: None,
            join_type: JoinType::empty(),
            constraint: JoinConstraint::None,
            index_hint: IndexHint::default(),
            cursor: -1,
            is_cte: false,
            is_recursive: false,
            correlated: false,
        }
    }

    pub fn subquery(select: Select) -> Self {
        SrcItem { select: Some(Box::new(select)), ..SrcItem::table("") }
    }

    pub fn is_subquery(&self) -> bool {
        self.select.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SrcList {
    pub items: Vec<SrcItem>,
}

impl SrcList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if this FROM clause joins more than one term — used by several
    /// flattener guards ("P is a join", §4.5 guards 2/7/17).
    pub fn is_join(&self) -> bool {
        self.items.len() > 1
    }
}
