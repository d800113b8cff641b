//! ASCII case-folding helpers used for case-insensitive identifier comparison
//! throughout the schema catalog (§4.1).
//!
//! Grounded on `camdencheek-sqlite_rs/src/util/strings.rs`
//! (`sqlite3UpperToLower`); SQL identifiers fold only ASCII case, never full
//! Unicode case folding, so this does not reach for a locale-aware crate.

/// Case-insensitive equality for SQL identifiers (ASCII fold only).
pub fn ident_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// A hashable, case-insensitive key for catalog maps (table/index/trigger
/// names). Stores the original (case-preserved) text alongside a lowercase
/// form used for hashing/equality, matching the "name (case-preserved,
/// case-insensitive compare)" invariant on the Table descriptor in §3.
#[derive(Debug, Clone)]
pub struct CiStr {
    original: smol_str::SmolStr,
    folded: smol_str::SmolStr,
}

impl CiStr {
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        CiStr {
            original: smol_str::SmolStr::new(s),
            folded: smol_str::SmolStr::new(s.to_ascii_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl PartialEq for CiStr {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}
impl Eq for CiStr {}

impl std::hash::Hash for CiStr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.folded.hash(state)
    }
}

impl std::fmt::Display for CiStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_eq_is_case_insensitive() {
        assert!(ident_eq("Users", "users"));
        assert!(ident_eq("USERS", "users"));
        assert!(!ident_eq("Users", "user"));
    }

    #[test]
    fn cistr_preserves_case_but_hashes_folded() {
        let a = CiStr::new("Users");
        let b = CiStr::new("USERS");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Users");
    }
}
