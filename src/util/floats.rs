//! Float/int boundary helpers, grounded on `camdencheek-sqlite_rs/src/util/floats.rs`.

/// True if `f` round-trips exactly through `i64`, used by the record codec to
/// decide whether a REAL value can be stored using the smaller integer
/// serial-type without losing precision.
pub fn exactly_representable_as_i64(f: f64) -> bool {
    f.is_finite() && f == (f as i64) as f64
}
