//! Minimal-width integer selection, grounded on `camdencheek-sqlite_rs/src/util/ints.rs`.

/// Number of bytes needed to store `v` as a serial-type 1/2/3/4/6/8-byte
/// signed integer per §4.3's encoding table (serial types 1..4 cover 1,2,4,8
/// bytes for rowids and small integers; 8 bytes always works).
pub fn min_signed_bytes(v: i64) -> u8 {
    if (-128..=127).contains(&v) {
        1
    } else if (-32768..=32767).contains(&v) {
        2
    } else if (-2147483648..=2147483647).contains(&v) {
        4
    } else {
        8
    }
}
