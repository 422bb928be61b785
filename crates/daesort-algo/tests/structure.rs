//! Structural properties of the decomposition on generated systems

use daesort_algo::{
    BlockDecomposer, BlockOracle, Decomposition, DependencyAnalyzer, DependencyPattern,
    DulmageMendelsohn, Matching,
};
use daesort_core::{invert_permutation, Category, EquationSystem, ExprGraph, NodeId, OcpModel};

/// Deterministic pseudo-random sparse pattern with a zero-free diagonal.
fn sparse_pattern(n: usize, seed: u64) -> DependencyPattern {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    let rows: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            let mut row = vec![i];
            for _ in 0..2 {
                row.push(next() % n);
            }
            row.sort_unstable();
            row.dedup();
            row
        })
        .collect();
    DependencyPattern::from_rows(n, &rows)
}

#[test]
fn decomposition_is_block_lower_triangular() {
    for seed in 1..20 {
        let pattern = sparse_pattern(12, seed);
        let blt = BlockDecomposer::new().decompose("test", &pattern).unwrap();
        let permuted = pattern.permuted(blt.row_perm(), blt.col_perm()).unwrap();
        assert!(blt.is_block_lower_triangular(&permuted), "seed {}", seed);
    }
}

#[test]
fn blocks_partition_rows_and_columns() {
    for seed in 1..20 {
        let pattern = sparse_pattern(10, seed);
        let blt = BlockDecomposer::new().decompose("test", &pattern).unwrap();

        let mut rows = blt.row_perm().to_vec();
        rows.sort_unstable();
        assert_eq!(rows, (0..10).collect::<Vec<_>>());
        let mut cols = blt.col_perm().to_vec();
        cols.sort_unstable();
        assert_eq!(cols, (0..10).collect::<Vec<_>>());

        assert_eq!(blt.row_blocks().first(), Some(&0));
        assert_eq!(blt.row_blocks().last(), Some(&10));
        assert_eq!(blt.row_blocks(), blt.col_blocks());
        let sizes: usize = (0..blt.num_blocks()).map(|b| blt.block_rows(b).len()).sum();
        assert_eq!(sizes, 10);
    }
}

#[test]
fn decomposition_is_deterministic() {
    let pattern = sparse_pattern(15, 7);
    let first = DulmageMendelsohn.decompose(&pattern);
    for _ in 0..5 {
        assert_eq!(DulmageMendelsohn.decompose(&pattern), first);
    }
}

/// Keeps the Dulmage-Mendelsohn permutations but reports one block per coarse part.
struct CoarseOnly;

impl BlockOracle for CoarseOnly {
    fn decompose(&self, pattern: &DependencyPattern) -> Decomposition {
        let mut d = DulmageMendelsohn.decompose(pattern);
        let (m, n) = pattern.shape();
        d.row_blocks = vec![0, m];
        d.col_blocks = vec![0, n];
        d
    }
}

#[test]
fn decomposer_accepts_other_oracles() {
    let pattern = sparse_pattern(12, 3);
    let fine = BlockDecomposer::new().decompose("test", &pattern).unwrap();
    let coarse = BlockDecomposer::with_oracle(CoarseOnly)
        .decompose("test", &pattern)
        .unwrap();
    assert_eq!(coarse.num_blocks(), 1);
    assert_eq!(coarse.max_block_size(), 12);
    assert_eq!(coarse.row_perm(), fine.row_perm());
    let permuted = pattern.permuted(coarse.row_perm(), coarse.col_perm()).unwrap();
    assert!(coarse.is_block_lower_triangular(&permuted));

    // the strict checks still apply to whatever the oracle returns
    let singular = DependencyPattern::from_rows(2, &[vec![0], vec![0]]);
    assert!(BlockDecomposer::with_oracle(CoarseOnly)
        .decompose("test", &singular)
        .is_err());
}

#[test]
fn matching_of_nonsingular_pattern_is_perfect() {
    for seed in 1..10 {
        let pattern = sparse_pattern(9, seed);
        let matching = Matching::maximum(&pattern);
        assert!(matching.is_perfect());
        for (i, j) in matching.row_to_col.iter().enumerate() {
            let j = j.unwrap();
            assert!(pattern.depends(i, j));
        }
    }
}

#[test]
fn pattern_from_expressions() {
    let mut g = ExprGraph::new();
    let xs: Vec<NodeId> = (0..4).map(|i| g.symbol(&format!("x{i}"))).collect();
    // e_i = x_i * x_{i+1}, last one wraps around
    let eqs: Vec<NodeId> = (0..4).map(|i| g.mul(xs[i], xs[(i + 1) % 4])).collect();
    let pattern = DependencyAnalyzer::new(&g, &eqs, &xs).unwrap().pattern();
    assert_eq!(pattern.nnz(), 8);
    let blt = BlockDecomposer::new().decompose("cycle", &pattern).unwrap();
    assert_eq!(blt.num_blocks(), 1);
    assert_eq!(blt.max_block_size(), 4);
}

#[test]
fn permutation_round_trip_restores_system() {
    let mut m = OcpModel::new();
    let mut eqs = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let id = m.declare(name, Category::Algebraic).unwrap();
        let var = m.registry.get(id).var;
        eqs.push(m.graph.sin(var));
    }
    let unknowns = m.implicit.unknowns().to_vec();
    let mut system = EquationSystem::from_parts(eqs.clone(), unknowns.clone());

    let rows = [2, 0, 3, 1];
    let cols = [3, 1, 0, 2];
    system.permute(&rows, &cols).unwrap();
    assert_eq!(system.equations()[0], eqs[2]);
    assert_eq!(system.unknowns()[0], unknowns[3]);

    system
        .permute(&invert_permutation(&rows), &invert_permutation(&cols))
        .unwrap();
    assert_eq!(system.equations(), eqs.as_slice());
    assert_eq!(system.unknowns(), unknowns.as_slice());
}
