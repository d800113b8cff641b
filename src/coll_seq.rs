//! Collating sequences: a name plus a comparison routine, used by the record
//! codec (§4.3) to order TEXT values.
//!
//! Grounded on `camdencheek-sqlite_rs/src/coll_seq.rs`; the C `xCmp` function
//! pointer + `pUser` argument pair becomes a plain `Fn` trait object — no
//! `unsafe extern "C"` calling convention is needed once the comparator
//! never has to cross an FFI boundary.

use std::cmp::Ordering;
use std::rc::Rc;

pub type CompareFn = dyn Fn(&[u8], &[u8]) -> Ordering;

/// A named ordering over byte strings. Builtin `binary` compares bytes
/// lexicographically; `nocase` folds ASCII case first.
#[derive(Clone)]
pub struct CollSeq {
    pub name: String,
    cmp: Rc<CompareFn>,
}

impl CollSeq {
    pub fn new(name: impl Into<String>, cmp: Rc<CompareFn>) -> Self {
        CollSeq { name: name.into(), cmp }
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (self.cmp)(a, b)
    }

    pub fn binary() -> Self {
        CollSeq::new("BINARY", Rc::new(|a, b| a.cmp(b)))
    }

    pub fn nocase() -> Self {
        CollSeq::new("NOCASE", Rc::new(|a, b| {
            let fold = |s: &[u8]| s.iter().map(|c| c.to_ascii_lowercase()).collect::<Vec<u8>>();
            fold(a).cmp(&fold(b))
        }))
    }

    pub fn rtrim() -> Self {
        CollSeq::new("RTRIM", Rc::new(|a, b| {
            let trim = |s: &[u8]| {
                let mut end = s.len();
                while end > 0 && s[end - 1] == b' ' {
                    end -= 1;
                }
                &s[..end]
            };
            trim(a).cmp(trim(b))
        }))
    }
}

impl std::fmt::Debug for CollSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollSeq").field("name", &self.name).finish()
    }
}

/// Collations compare equal by name; two `CollSeq` values constructed the
/// same way are interchangeable for every caller that only ever looks one up
/// by name out of a shared registry.
impl PartialEq for CollSeq {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nocase_folds_ascii() {
        let c = CollSeq::nocase();
        assert_eq!(c.compare(b"Hello", b"hello"), Ordering::Equal);
        assert_eq!(c.compare(b"abc", b"abd"), Ordering::Less);
    }

    #[test]
    fn rtrim_ignores_trailing_spaces() {
        let c = CollSeq::rtrim();
        assert_eq!(c.compare(b"abc  ", b"abc"), Ordering::Equal);
    }
}
