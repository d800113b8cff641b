/// Asserts that a condition known (or hoped) to always be true actually held.
///
/// Mirrors the teacher's `always!`/`never!` pair: in debug builds these are
/// load-bearing assertions, in release they degrade to a plain boolean so a
/// wrong assumption never panics a production build by itself.
#[macro_export]
macro_rules! always {
    ($e:expr) => {{
        let v = $e;
        debug_assert!(v);
        v
    }};
}

/// Asserts that a condition believed to never hold did not in fact hold.
#[macro_export]
macro_rules! never {
    ($e:expr) => {{
        let v = $e;
        debug_assert!(!v);
        v
    }};
}
