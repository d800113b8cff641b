//! Embeddable relational data store: SQL compiler and virtual machine core.
//!
//! This crate is the CORE of a SQLite-shaped embeddable database: a schema
//! catalog, an expression/statement compiler with a subquery flattener, a
//! register-based bytecode virtual machine, a row/key codec, a row-hash
//! engine for `IN`/`DISTINCT`, and a trigger engine. Parsing SQL text into
//! the statement types this crate compiles, and persisting B-tree pages to
//! disk, are both out of scope — [`storage::Storage`] is the seam where a
//! real paged backend plugs in, and [`compiler::Stmt`] is the seam where a
//! real SQL parser plugs in.
//!
//! [`db::Database`] ties the pieces together into the handle an embedder
//! actually drives: prepare a [`compiler::Stmt`], bind host parameters, step
//! the resulting [`vdbe::Vdbe`] for rows, finalize.

pub mod agg;
pub mod coll_seq;
pub mod compiler;
pub mod db;
pub mod error;
pub mod expr;
pub mod from;
pub mod func;
pub mod index;
pub mod macros;
pub mod mem;
pub mod namecontext;
pub mod opcodes;
pub mod parse;
pub mod record;
pub mod rowset;
pub mod schema;
pub mod select;
pub mod storage;
pub mod table;
pub mod token;
pub mod token_type;
pub mod trace;
pub mod trigger;
pub mod util;
pub mod vdbe;

pub use db::Database;
pub use error::{Error, Result};
pub use mem::Value;
