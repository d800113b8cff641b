//! Trace expander (C7, §4.7): substitutes bound host-parameter values into
//! SQL text for diagnostics, e.g. for a `log::trace!` of the statement a
//! program actually ran with.
//!
//! There is no lexical grammar in this crate to share (parsing is an
//! external collaborator, §1), so [`expand`] carries just enough of a
//! classifier to skip over string/identifier literals and comments without
//! misreading a `?` inside them as a parameter marker.

use crate::mem::Value;

/// Returns `sql` with every unquoted `?` or `?N` parameter marker replaced
/// by a literal form of `variables[N - 1]` (1-based, matching
/// [`crate::vdbe::Vdbe::bind_int`] and friends). An unnumbered `?` takes the
/// next index after the last one seen, starting at 1. A marker with no
/// corresponding binding is rendered as `NULL`.
pub fn expand(sql: &str, variables: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut next_auto = 1usize;

    while let Some((_, c)) = chars.next() {
        match c {
            '\'' => {
                out.push(c);
                copy_quoted(&mut chars, &mut out, '\'');
            }
            '"' | '`' => {
                out.push(c);
                copy_quoted(&mut chars, &mut out, c);
            }
            '[' => {
                out.push(c);
                for (_, c2) in chars.by_ref() {
                    out.push(c2);
                    if c2 == ']' {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(c);
                for (_, c2) in chars.by_ref() {
                    out.push(c2);
                    if c2 == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(c);
                let (_, star) = chars.next().unwrap();
                out.push(star);
                let mut prev_star = false;
                for (_, c2) in chars.by_ref() {
                    out.push(c2);
                    if prev_star && c2 == '/' {
                        break;
                    }
                    prev_star = c2 == '*';
                }
            }
            '?' => {
                let mut digits = String::new();
                while let Some((_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index = if digits.is_empty() {
                    let i = next_auto;
                    next_auto += 1;
                    i
                } else {
                    let i: usize = digits.parse().unwrap_or(0);
                    next_auto = i + 1;
                    i
                };
                out.push_str(&literal(variables.get(index.wrapping_sub(1))));
            }
            _ => out.push(c),
        }
    }
    out
}

fn copy_quoted(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, out: &mut String, quote: char) {
    while let Some((_, c)) = chars.next() {
        out.push(c);
        if c == quote {
            if matches!(chars.peek(), Some((_, q)) if *q == quote) {
                let (_, q) = chars.next().unwrap();
                out.push(q);
                continue;
            }
            break;
        }
    }
}

fn literal(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::Integer(i)) => i.to_string(),
        Some(Value::Real(f)) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{f:.1}")
            } else {
                format!("{f}")
            }
        }
        Some(Value::Text(s)) => format!("'{}'", s.replace('\'', "''")),
        Some(Value::Blob(b)) => {
            let mut s = String::with_capacity(b.len() * 2 + 3);
            s.push_str("x'");
            for byte in b.as_bytes() {
                s.push_str(&format!("{byte:02x}"));
            }
            s.push('\'');
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_numbered_and_auto_incrementing_markers() {
        let vars = vec![Value::Integer(7), Value::from("hi")];
        let out = expand("SELECT ?1, ?", &vars);
        assert_eq!(out, "SELECT 7, 'hi'");
    }

    #[test]
    fn skips_markers_inside_string_literals_and_comments() {
        let vars = vec![Value::Integer(1)];
        let out = expand("SELECT '?', ? -- what about ?\n", &vars);
        assert_eq!(out, "SELECT '?', 1 -- what about ?\n");
    }

    #[test]
    fn escapes_single_quotes_in_text_values() {
        let vars = vec![Value::from("it's")];
        assert_eq!(expand("SELECT ?", &vars), "SELECT 'it''s'");
    }

    #[test]
    fn renders_missing_binding_as_null() {
        let vars: Vec<Value> = Vec::new();
        assert_eq!(expand("SELECT ?", &vars), "SELECT NULL");
    }

    #[test]
    fn renders_blob_as_hex_literal() {
        let vars = vec![Value::blob(&[0xde, 0xad])];
        assert_eq!(expand("SELECT ?", &vars), "SELECT x'dead'");
    }
}
