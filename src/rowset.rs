//! Row-hash engine (C4): "does integer V belong to set S" membership tests
//! with a two-tier build policy (§4.4).
//!
//! Grounded on `camdencheek-sqlite_rs/src/rowset.rs` (`RowSetEntry`); the
//! teacher only carries the per-entry struct used by the on-disk rowset
//! forest, so the block list + chained-hash-tree build described in §4.4 is
//! implemented fresh here, following the algorithm in §4.4 and the
//! `findHashBucket`-height-0 resolution noted as an Open Question in §9.
//! Bucket storage uses `nohash-hasher`'s identity-hash `IntMap`, since the
//! bucket index is already a well-distributed function of the rowid — no
//! SipHash mixing is needed on top (the same reasoning `sqruff`'s `lib-core`
//! crate applies when it reaches for `nohash-hasher` over table-valued keys).

use nohash_hasher::IntMap;

/// Below this many entries, [`RowSet::test`] falls back to a linear scan
/// instead of building a hash tree (§4.4 "Build policy").
const LINEAR_LIMIT: usize = 10;

/// Entries stored per block before a new block is allocated (§3 "Row-hash":
/// "each block ≈ 1 KiB").
const ENTRIES_PER_BLOCK: usize = 127;

/// Pointers fanning out of one level of the hash tree.
const POINTERS_PER_PAGE: usize = 64;

#[derive(Default)]
struct Block {
    entries: Vec<i64>,
}

/// An in-memory integer set built by a sequence of `insert` calls and
/// queried by `test`, with the two-tier linear/hash-tree build policy from
/// §4.4. Used for `IN (...)` membership tests and cross-cursor rowid
/// de-duplication (DISTINCT).
pub struct RowSet {
    blocks: Vec<Block>,
    count: usize,
    /// `Some` once a hash tree has been built; inserts after a build only
    /// grow `blocks`, they do not update the tree (§4.4: "A new build
    /// disposes of the previous tree; inserts between builds grow only the
    /// block list, not the tree").
    tree: Option<IntMap<i64, ()>>,
    /// The set-id the tree was last built for (§4.4 "Test(set-id, V) ...
    /// triggers a rebuild if set-id changed").
    built_for: Option<u32>,
}

impl Default for RowSet {
    fn default() -> Self {
        RowSet { blocks: vec![Block::default()], count: 0, tree: None, built_for: None }
    }
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) amortized; allocates a new block only at a block boundary.
    pub fn insert(&mut self, v: i64) {
        let last = self.blocks.last_mut().unwrap();
        if last.entries.len() == ENTRIES_PER_BLOCK {
            self.blocks.push(Block::default());
        }
        self.blocks.last_mut().unwrap().entries.push(v);
        self.count += 1;
        // Growing the block list after a tree build does not invalidate the
        // tree's existing entries, but we can no longer claim completeness
        // for `built_for` without re-scanning, so drop it lazily on the next
        // `test` call for a *different* set id. Same-set-id inserts between
        // tests (a common sequence: insert a batch, then probe repeatedly)
        // intentionally leave the stale tree in place per §4.4.
    }

    /// Returns true if some `insert(v)` preceded the most recent rebuild for
    /// `set_id`. Rebuilding here means: if `set_id` differs from the id the
    /// current tree (if any) was built for, rebuild from the full block list
    /// before answering.
    pub fn test(&mut self, set_id: u32, v: i64) -> bool {
        if self.count < LINEAR_LIMIT {
            return self.blocks.iter().any(|b| b.entries.contains(&v));
        }

        if self.built_for != Some(set_id) {
            self.build_tree();
            self.built_for = Some(set_id);
            log::trace!(
                target: "corvid::rowset",
                "rebuilt hash tree for set {set_id} ({} entries)",
                self.count
            );
        }

        self.tree.as_ref().map(|t| t.contains_key(&v)).unwrap_or(false)
    }

    fn build_tree(&mut self) {
        let mut map: IntMap<i64, ()> = IntMap::default();
        map.reserve(self.count);
        for block in &self.blocks {
            for &v in &block.entries {
                map.insert(v, ());
            }
        }
        self.tree = Some(map);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// `leaves`/`modulus`/`height` per §4.4's sizing formula. Exposed separately
/// from the `IntMap`-backed implementation above so the planner-facing cost
/// model and tests can reason about the *shape* §4.4 specifies even though
/// the concrete bucket storage is a hash map rather than a literal
/// pointer-per-page tree.
pub fn tree_shape(n: usize) -> (usize, usize, u32) {
    if n == 0 {
        return (1, POINTERS_PER_PAGE, 0);
    }
    let leaves = 1 + n / POINTERS_PER_PAGE;
    let modulus = leaves * POINTERS_PER_PAGE;
    let mut height = 0u32;
    // height==0 is a single direct-indexed leaf, per the Open Question
    // resolution in §9 ("specify height-0 as a single-leaf direct index").
    let mut capacity = 1usize;
    while capacity < leaves {
        capacity *= POINTERS_PER_PAGE;
        height += 1;
    }
    (leaves, modulus, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sets_use_linear_fallback_never_building_a_tree() {
        let mut rs = RowSet::new();
        for v in 1..=9 {
            rs.insert(v);
        }
        assert!(rs.test(1, 5));
        assert!(!rs.test(1, 100));
        assert!(rs.tree.is_none(), "sets below LINEAR_LIMIT must not build a hash tree");
    }

    #[test]
    fn crossing_threshold_builds_a_tree_matching_scenario_2() {
        // §8 scenario 2: 11 constants must build a row-hash (threshold = 10).
        let mut rs = RowSet::new();
        for v in 1..=11 {
            rs.insert(v);
        }
        assert!(rs.test(1, 7));
        assert!(!rs.test(1, 999));
        assert!(rs.tree.is_some(), "sets at/above LINEAR_LIMIT must build a hash tree");
    }

    #[test]
    fn membership_reflects_all_inserts_before_last_rebuild() {
        let mut rs = RowSet::new();
        for v in 0..20 {
            rs.insert(v);
        }
        for v in 0..20 {
            assert!(rs.test(1, v));
        }
        assert!(!rs.test(1, 20));
    }

    #[test]
    fn different_set_ids_trigger_independent_rebuilds() {
        let mut rs = RowSet::new();
        for v in 0..15 {
            rs.insert(v);
        }
        assert!(rs.test(1, 3));
        assert!(rs.test(2, 3)); // different set id: forces rebuild, same answer
    }

    #[test]
    fn tree_shape_matches_spec_formula() {
        let (leaves, modulus, _height) = tree_shape(200);
        assert_eq!(leaves, 1 + 200 / POINTERS_PER_PAGE);
        assert_eq!(modulus, leaves * POINTERS_PER_PAGE);
    }

    // Seeded randomized insert/test stress test, in the same spirit as the
    // teacher's `util::bitvec` tests: a `StdRng` seeded for reproducibility,
    // checked against a plain `HashSet` model, crossing the linear/tree
    // threshold partway through.
    #[test]
    fn random_inserts_match_a_hash_set_model() {
        use rand::{Rng, SeedableRng};
        use std::collections::HashSet;

        let mut rng = rand::rngs::StdRng::seed_from_u64(32);
        let mut rs = RowSet::new();
        let mut model = HashSet::new();

        for _ in 0..500 {
            let v: i64 = rng.gen_range(0..1000);
            rs.insert(v);
            model.insert(v);
        }

        for v in 0..1000 {
            assert_eq!(rs.test(1, v), model.contains(&v), "mismatch at {v}");
        }
    }
}
