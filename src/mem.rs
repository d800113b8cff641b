//! The memory cell (register) type shared by the record codec (C3) and the
//! virtual machine's register file (C6).
//!
//! Grounded on `camdencheek-sqlite_rs/src/mem.rs` / `record.rs`'s `Mem`
//! alias. The C `Mem` struct is one allocation with a flags bitmask
//! (`Null|Int|Real|Str|Blob|Term|Utf8|...|Static|Dyn|Short`); here that
//! collapses into a tagged `Value` enum, which makes "exactly one of
//! {Null,Int,Real,Str,Blob}" a property of the type system instead of a
//! runtime invariant to maintain by hand. See SPEC_FULL.md §3.1 for why the
//! `Static`/`Dyn` split collapses to one `Shared` representation.

use std::rc::Rc;

use smol_str::SmolStr;

/// Inline buffer size for blobs, matching the `NBFS` inline-string threshold
/// referenced by §3's Memory cell invariant.
pub const NBFS: usize = 23;

/// A blob payload: either inline (`Short`, ≤ `NBFS` bytes, no allocation) or
/// heap-allocated and reference-counted (`Shared`), never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    Short([u8; NBFS], u8),
    Shared(Rc<[u8]>),
}

impl Blob {
    pub fn new(bytes: &[u8]) -> Self {
        if bytes.len() <= NBFS {
            let mut buf = [0u8; NBFS];
            buf[..bytes.len()].copy_from_slice(bytes);
            Blob::Short(buf, bytes.len() as u8)
        } else {
            Blob::Shared(Rc::from(bytes))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Blob::Short(buf, len) => &buf[..*len as usize],
            Blob::Shared(rc) => rc,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the payload lives inline rather than on the heap — exposed
    /// so tests can assert the Short/Shared invariant directly.
    pub fn is_short(&self) -> bool {
        matches!(self, Blob::Short(..))
    }
}

/// A single VM register / record-column value (§3 "Memory cell").
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(SmolStr),
    Blob(Blob),
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(SmolStr::new(s.as_ref()))
    }

    pub fn blob(bytes: &[u8]) -> Self {
        Value::Blob(Blob::new(bytes))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) => Some(*r as i64),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Text(_) | Value::Blob(_) => self.as_f64().map(|f| f != 0.0).unwrap_or(false),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_blob_stays_inline() {
        let b = Blob::new(b"hello");
        assert!(b.is_short());
        assert_eq!(b.as_bytes(), b"hello");
    }

    #[test]
    fn long_blob_is_shared() {
        let data = vec![7u8; NBFS + 1];
        let b = Blob::new(&data);
        assert!(!b.is_short());
        assert_eq!(b.as_bytes(), &data[..]);
    }
}
