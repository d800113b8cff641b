//! Column-usage bitmask, grounded on `camdencheek-sqlite_rs/src/util/bitmask.rs`.
//!
//! Used by `SrcItem::col_used` to track which table columns a query actually
//! reads, so a covering index can be recognized without visiting the table.

pub type Bitmask = u64;

/// Bit position for column `i`. Per §4.5/`from.rs`, column 63 and beyond all
/// share the top bit, so "is this a covering index" degrades to "assume not"
/// once a table has more than 63 columns.
pub fn bit_for_column(i: usize) -> Bitmask {
    if i >= 63 {
        1u64 << 63
    } else {
        1u64 << i
    }
}
