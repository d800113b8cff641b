//! Record codec (C3): typed value serialization and comparison (§4.3).
//!
//! Grounded on `camdencheek-sqlite_rs/src/record.rs` (`UnpackedRecord`), with
//! the C union/raw-pointer key representation replaced by an owned
//! `Vec<Value>` — a parsed record never needs to alias the table's on-disk
//! bytes once decoded, so there is no lifetime to preserve.

use std::cmp::Ordering;

use crate::coll_seq::CollSeq;
use crate::mem::{Blob, Value};
use crate::util::varint::{get_varint, put_varint};

/// The serial-type tag preceding each column's payload (§4.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialType {
    Null,
    I8,
    I16,
    I32,
    I64,
    F64,
    Blob(usize),
    Text(usize),
}

impl SerialType {
    fn code(self) -> u64 {
        match self {
            SerialType::I8 => 1,
            SerialType::I16 => 2,
            SerialType::I32 => 3,
            SerialType::I64 => 4,
            SerialType::F64 => 5,
            SerialType::Null => 6,
            SerialType::Blob(n) => (n as u64) * 2 + 12,
            SerialType::Text(n) => (n as u64) * 2 + 13,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(SerialType::I8),
            2 => Some(SerialType::I16),
            3 => Some(SerialType::I32),
            4 => Some(SerialType::I64),
            5 => Some(SerialType::F64),
            6 => Some(SerialType::Null),
            0 | 7..=11 => None,
            n if n >= 12 && n % 2 == 0 => Some(SerialType::Blob(((n - 12) / 2) as usize)),
            n if n >= 13 && n % 2 == 1 => Some(SerialType::Text(((n - 13) / 2) as usize)),
            _ => None,
        }
    }

    fn payload_len(self) -> usize {
        match self {
            SerialType::Null => 0,
            SerialType::I8 => 1,
            SerialType::I16 => 2,
            SerialType::I32 => 4,
            SerialType::I64 => 8,
            SerialType::F64 => 8,
            SerialType::Blob(n) | SerialType::Text(n) => n,
        }
    }

    fn of(v: &Value) -> Self {
        match v {
            Value::Null => SerialType::Null,
            Value::Integer(i) => match crate::util::ints::min_signed_bytes(*i) {
                1 => SerialType::I8,
                2 => SerialType::I16,
                4 => SerialType::I32,
                _ => SerialType::I64,
            },
            Value::Real(_) => SerialType::F64,
            // TEXT payloads carry a trailing NUL (§3 "Term" cell flag), so
            // the serial type's length counts one more byte than the string.
            Value::Text(s) => SerialType::Text(s.len() + 1),
            Value::Blob(b) => SerialType::Blob(b.len()),
        }
    }
}

/// Encodes one row as `[varint serial-type]... [payload]...` (header then
/// body, matching the on-disk record format §4.3 describes).
pub fn encode_record(values: &[Value]) -> Vec<u8> {
    let types: Vec<SerialType> = values.iter().map(SerialType::of).collect();

    let mut header = Vec::new();
    for t in &types {
        put_varint(&mut header, t.code());
    }
    let mut header_len_buf = Vec::new();
    // The header length varint itself is included in the length it reports,
    // so compute it by trying successive sizes until stable.
    let mut guess = header.len() + 1;
    loop {
        header_len_buf.clear();
        put_varint(&mut header_len_buf, guess as u64);
        if header_len_buf.len() + header.len() == guess {
            break;
        }
        guess = header_len_buf.len() + header.len();
    }

    let mut out = header_len_buf;
    out.extend_from_slice(&header);
    for v in values {
        append_payload(&mut out, v);
    }
    out
}

fn append_payload(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null => {}
        Value::Integer(i) => match SerialType::of(v) {
            SerialType::I8 => out.push(*i as i8 as u8),
            SerialType::I16 => out.extend_from_slice(&(*i as i16).to_be_bytes()),
            SerialType::I32 => out.extend_from_slice(&(*i as i32).to_be_bytes()),
            _ => out.extend_from_slice(&i.to_be_bytes()),
        },
        Value::Real(f) => out.extend_from_slice(&f.to_be_bytes()),
        Value::Text(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Blob(b) => out.extend_from_slice(b.as_bytes()),
    }
}

/// Decodes a record produced by [`encode_record`] back into owned [`Value`]s.
pub fn decode_record(buf: &[u8]) -> crate::error::Result<Vec<Value>> {
    let (header_len, header_len_size) = get_varint(buf)
        .ok_or_else(|| crate::error::Error::Corrupt("truncated record header".into()))?;
    let header_len = header_len as usize;
    if header_len > buf.len() {
        return Err(crate::error::Error::Corrupt("record header overruns buffer".into()));
    }

    let mut types = Vec::new();
    let mut pos = header_len_size;
    while pos < header_len {
        let (code, n) = get_varint(&buf[pos..header_len])
            .ok_or_else(|| crate::error::Error::Corrupt("truncated serial type".into()))?;
        let t = SerialType::from_code(code)
            .ok_or_else(|| crate::error::Error::Corrupt(format!("bad serial type {code}")))?;
        types.push(t);
        pos += n;
    }

    let mut body = header_len;
    let mut out = Vec::with_capacity(types.len());
    for t in types {
        let n = t.payload_len();
        if body + n > buf.len() {
            return Err(crate::error::Error::Corrupt("record payload overruns buffer".into()));
        }
        let payload = &buf[body..body + n];
        out.push(decode_payload(t, payload)?);
        body += n;
    }
    Ok(out)
}

fn decode_payload(t: SerialType, payload: &[u8]) -> crate::error::Result<Value> {
    Ok(match t {
        SerialType::Null => Value::Null,
        SerialType::I8 => Value::Integer(payload[0] as i8 as i64),
        SerialType::I16 => Value::Integer(i16::from_be_bytes(payload.try_into().unwrap()) as i64),
        SerialType::I32 => Value::Integer(i32::from_be_bytes(payload.try_into().unwrap()) as i64),
        SerialType::I64 => Value::Integer(i64::from_be_bytes(payload.try_into().unwrap())),
        SerialType::F64 => Value::Real(f64::from_be_bytes(payload.try_into().unwrap())),
        SerialType::Blob(_) => Value::Blob(Blob::new(payload)),
        SerialType::Text(_) => {
            // Strip the trailing NUL the encoder appends (§3 "Term" cell flag).
            let text = payload.split_last().map(|(_, rest)| rest).unwrap_or(payload);
            Value::Text(smol_str::SmolStr::new(std::str::from_utf8(text).map_err(|_| {
                crate::error::Error::Corrupt("text column is not valid utf-8".into())
            })?))
        }
    })
}

/// Value-pair comparison per §4.3's five ordering rules. `coll` is consulted
/// only when both sides are TEXT.
pub fn compare_values(a: &Value, b: &Value, coll: Option<&CollSeq>) -> Ordering {
    use Value::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,

        (Integer(_) | Real(_), Integer(_) | Real(_)) => compare_numeric(a, b),
        (Integer(_) | Real(_), _) => Ordering::Less,
        (_, Integer(_) | Real(_)) => Ordering::Greater,

        (Text(_), Blob(_)) => Ordering::Less,
        (Blob(_), Text(_)) => Ordering::Greater,

        (Text(x), Text(y)) => match coll {
            Some(c) => c.compare(x.as_bytes(), y.as_bytes()).then_with(|| x.len().cmp(&y.len())),
            None => x.as_bytes().cmp(y.as_bytes()),
        },
        (Blob(x), Blob(y)) => x.as_bytes().cmp(y.as_bytes()),
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        _ => {
            let x = a.as_f64().unwrap();
            let y = b.as_f64().unwrap();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
    }
}

/// Per-column comparison metadata for an index key (§4.3 "Index-key
/// comparison" / §3 "Key-info").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyInfo {
    pub collations: Vec<Option<CollSeq>>,
    pub descending: Vec<bool>,
}

impl KeyInfo {
    pub fn n_field(&self) -> usize {
        self.descending.len()
    }
}

/// Compares two index keys field-by-field, honoring each column's collation
/// and descending flag, then the trailing rowid, per §4.3's "Index-key
/// comparison" algorithm. `incr_key` implements the "find first greater
/// than" search mode: when one side runs out first, the shorter key is
/// normally less, but `incr_key` inverts that so a prefix match sorts
/// larger than any key it is a prefix of.
pub fn compare_index_keys(
    key_info: &KeyInfo,
    a: &[Value],
    a_rowid: Option<i64>,
    b: &[Value],
    b_rowid: Option<i64>,
    incr_key: bool,
) -> Ordering {
    let n = key_info.n_field().min(a.len()).min(b.len());
    for i in 0..n {
        let raw = compare_values(&a[i], &b[i], key_info.collations.get(i).and_then(|c| c.as_ref()));
        let ord = if key_info.descending.get(i).copied().unwrap_or(false) {
            raw.reverse()
        } else {
            raw
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    let a_shorter = a.len() <= n;
    let b_shorter = b.len() <= n;
    if !a_shorter && !b_shorter {
        // Both sides have a field beyond the common key columns: compare the
        // trailing rowid.
        return match (a_rowid, b_rowid) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
        };
    }
    if a_shorter == b_shorter {
        return Ordering::Equal;
    }
    if a_shorter {
        if incr_key { Ordering::Greater } else { Ordering::Less }
    } else if incr_key {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Extracts the trailing rowid varint from an index key blob, per §4.2
/// "Cursor" / §4.3: index keys carry the rowid as a trailing field so a
/// row can be located from an index hit without a separate lookup column.
pub fn rowid_from_index_key(key: &[Value]) -> Option<i64> {
    match key.last() {
        Some(Value::Integer(i)) => Some(*i),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trip_matches_scenario_1() {
        // §8 scenario 1
        let row = vec![
            Value::Null,
            Value::Integer(42),
            Value::Real(3.14),
            Value::text("hello"),
            Value::blob(&[0x01, 0x02]),
        ];
        let encoded = encode_record(&row);
        let decoded = decode_record(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn scenario_1_serial_types_and_payload_sizes_match_the_spec_table() {
        // §8 scenario 1: (NULL,42,3.14,"hello",x'0102') must encode as serial
        // types 6,1,5,25,16 with payload sizes 0,1,8,6,2 — "hello" is a
        // NUL-terminated 6-byte TEXT (serial type 2*6+13 = 25).
        let row = vec![
            Value::Null,
            Value::Integer(42),
            Value::Real(3.14),
            Value::text("hello"),
            Value::blob(&[0x01, 0x02]),
        ];
        let types: Vec<SerialType> = row.iter().map(SerialType::of).collect();
        assert_eq!(types.iter().map(|t| t.code()).collect::<Vec<_>>(), vec![6, 1, 5, 25, 16]);
        assert_eq!(types.iter().map(|t| t.payload_len()).collect::<Vec<_>>(), vec![0, 1, 8, 6, 2]);
    }

    #[test]
    fn serial_type_codes_match_spec_table() {
        // §8 scenario 1: NULL is serial-type 6; a 1-byte signed int is 1; an
        // 8-byte float is 5; TEXT of length n (NUL-terminated, so n+1 bytes)
        // is 2(n+1)+13; BLOB of length n is 2n+12.
        assert_eq!(SerialType::of(&Value::Null).code(), 6);
        assert_eq!(SerialType::of(&Value::Integer(42)).code(), 1);
        assert_eq!(SerialType::of(&Value::Real(3.14)).code(), 5);
        assert_eq!(SerialType::of(&Value::text("hello")).code(), 25);
        assert_eq!(SerialType::of(&Value::blob(&[1, 2])).code(), 16);
    }

    #[test]
    fn null_orders_before_everything() {
        assert_eq!(compare_values(&Value::Null, &Value::Integer(0), None), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &Value::Null, None), Ordering::Equal);
    }

    #[test]
    fn numeric_orders_before_text_and_blob() {
        assert_eq!(compare_values(&Value::Integer(5), &Value::text("a"), None), Ordering::Less);
        assert_eq!(compare_values(&Value::text("a"), &Value::blob(&[1]), None), Ordering::Less);
    }

    #[test]
    fn mixed_int_and_real_compare_numerically() {
        assert_eq!(compare_values(&Value::Integer(2), &Value::Real(2.5), None), Ordering::Less);
    }

    #[test]
    fn index_key_compare_uses_trailing_rowid_on_tie() {
        let ki = KeyInfo { collations: vec![None], descending: vec![false] };
        let a = vec![Value::Integer(1), Value::Integer(100)];
        let b = vec![Value::Integer(1), Value::Integer(200)];
        assert_eq!(compare_index_keys(&ki, &a, Some(100), &b, Some(200), false), Ordering::Less);
    }

    #[test]
    fn descending_column_inverts_comparison() {
        let ki = KeyInfo { collations: vec![None], descending: vec![true] };
        let a = vec![Value::Integer(1)];
        let b = vec![Value::Integer(2)];
        assert_eq!(compare_index_keys(&ki, &a, None, &b, None, false), Ordering::Greater);
    }
}
