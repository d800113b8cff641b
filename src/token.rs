//! Source-text tokens attached to expression nodes for span tracking (§4.2).
//!
//! The teacher's `Token` borrows into the original SQL text via a raw
//! pointer (`camdencheek-sqlite_rs/src/token.rs`); since the parser that
//! produces that text is an external, non-goal collaborator here, `Token`
//! instead owns its text as a `SmolStr` — cheap to clone (inline up to 23
//! bytes) and with no lifetime to thread through the whole AST.

use smol_str::SmolStr;

/// A contiguous span of source text, used both for reconstructing result-set
/// column titles (§4.2) and as the operand text of literal/identifier
/// expression nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token(SmolStr);

impl Token {
    pub fn new(text: impl AsRef<str>) -> Self {
        Token(SmolStr::new(text.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::new(s)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
