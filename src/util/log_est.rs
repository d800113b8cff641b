//! Logarithmic row-count/cost estimates used by the query planner.
//!
//! Grounded on `camdencheek-sqlite_rs/src/util/log_est.rs`: a `LogEst` packs
//! an estimated count as `10*log2(count)`, so costs can be added instead of
//! multiplied during planning. Kept intentionally small — planning beyond
//! what the flattener and trigger code generator need is out of scope here.

pub type LogEst = i16;

/// `10*log2(n)`, rounded to the nearest integer, clamped to `LogEst` range.
pub fn from_count(n: u64) -> LogEst {
    if n == 0 {
        return 0;
    }
    let est = 10.0 * (n as f64).log2();
    est.round().clamp(i16::MIN as f64, i16::MAX as f64) as LogEst
}

/// Inverse of [`from_count`]: approximate row count implied by a `LogEst`.
pub fn to_count(est: LogEst) -> u64 {
    2f64.powf(est as f64 / 10.0).round() as u64
}

/// Adds two `LogEst` costs (multiplies the underlying quantities).
pub fn add(a: LogEst, b: LogEst) -> LogEst {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_approximately() {
        for n in [1u64, 2, 10, 100, 1_000_000] {
            let est = from_count(n);
            let back = to_count(est);
            let ratio = back as f64 / n as f64;
            assert!(ratio > 0.9 && ratio < 1.1, "n={n} back={back}");
        }
    }
}
