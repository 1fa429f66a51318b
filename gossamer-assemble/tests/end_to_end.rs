//! End-to-end scenarios against the assembled pipeline, exercising the
//! whole build -> trim -> prune -> pop -> contigs flow on small inputs
//! with known-by-construction answers, plus a larger randomized
//! rank/select cross-check against the brute-force oracle in
//! `gossamer-test-support`.

use rand::{Rng, SeedableRng};

use gossamer_assemble::bitops::{SparseArray, SparseArrayBuilder};
use gossamer_assemble::config::{
    BuildConfig, ContigExtractConfig, PipelineConfig, TipPruneConfig, TourBusConfig,
};
use gossamer_assemble::pipeline::{build_graph, run_pipeline};
use gossamer_test_support::{
    bubble_reads, edit_distance, tip_reads, BruteForceGraph, BruteForceSparse,
};

fn build_config(k: u64) -> BuildConfig {
    BuildConfig {
        k,
        asymmetric: false,
        threads: 1,
        capacity_hint: 1 << 12,
        ways_per_slot: 4,
    }
}

/// Scenario 1: a single 70-base reference, k=15. Symmetric mode stores
/// both strands, so `count == 2 * (70 - 15)`.
#[test]
fn single_reference_read_yields_expected_symmetric_edge_count() {
    let reference =
        b"ACCCCCGTCCCGGGTTCAGAGTCACGTACGGAGTGACTAATAGCCGTTGGATTATCTTACACGTGGACGA".to_vec();
    assert_eq!(reference.len(), 70);

    let reads = vec![reference];
    let graph = build_graph(&reads, &build_config(15)).unwrap();
    assert_eq!(graph.count(), 2 * (70 - 15));
    graph.check_symmetry().unwrap();
}

/// Scenario 2: two reads, one the reverse complement of the other.
/// Every edge's reverse complement is present, and their multiplicities
/// are paired (since both reads contribute to the same canonical
/// edges, every edge carries count 2 on both strands).
#[test]
fn read_and_its_reverse_complement_fold_onto_paired_edges() {
    let reference = b"ACCCCCGTCCCGGGTTCAGAGTCACGTACGGAGTGACTAATAGCCGTTGGATTATCTTACACGTGGACGA";
    let rc = gossamer_test_support::reverse_complement_seq(reference);

    let reads = vec![reference.to_vec(), rc];
    let graph = build_graph(&reads, &build_config(15)).unwrap();
    graph.check_symmetry().unwrap();

    for r in 0..graph.count() {
        let e = graph.select(r);
        let (found, rc_rank) = graph.access_and_rank(graph.reverse_complement_edge(e));
        assert!(found);
        assert_eq!(graph.multiplicity(r).unwrap(), graph.multiplicity(rc_rank).unwrap());
        assert_eq!(graph.multiplicity(r).unwrap(), 2);
    }
}

/// Scenario 3: a one-base-substitution bubble, 100 copies of the
/// reference against 3 of the variant. `pop-bubbles` with a permissive
/// edit-distance bound removes the minority branch from both strands.
#[test]
fn pop_bubbles_removes_low_coverage_single_base_variant() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let reference: Vec<u8> = (0..70)
        .map(|_| gossamer_test_support::BASES[rng.random_range(0..4)])
        .collect();
    let reads = bubble_reads(&reference, 100, 3);

    let config = PipelineConfig {
        build: build_config(15),
        coverage_trim: None,
        tip_prune: None,
        tour_bus: Some(TourBusConfig {
            max_edit_distance: 2,
            ..TourBusConfig::for_k(15)
        }),
        contig_extract: ContigExtractConfig {
            min_length: 0,
            min_coverage: 0,
            threads: 1,
        },
    };

    let before = build_graph(&reads, &config.build).unwrap();
    let result = run_pipeline(&reads, &config).unwrap();

    assert!(result.graph.count() < before.count());
    result.graph.check_symmetry().unwrap();
    // The surviving minimum edge multiplicity should no longer include
    // the minority branch's low-coverage edges once popped.
    for r in 0..result.graph.count() {
        assert!(result.graph.multiplicity(r).unwrap() >= 3);
    }
}

/// Scenario 4: a linear, unbranching sequence with uniform coverage
/// yields exactly one contig, equal to the input.
#[test]
fn linear_sequence_yields_single_matching_contig() {
    let reference = b"ACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGC".to_vec();
    let reads = vec![reference.clone(); 5];

    let config = PipelineConfig {
        build: build_config(15),
        coverage_trim: None,
        tip_prune: None,
        tour_bus: None,
        contig_extract: ContigExtractConfig {
            min_length: 0,
            min_coverage: 0,
            threads: 1,
        },
    };
    let result = run_pipeline(&reads, &config).unwrap();
    assert_eq!(result.contigs.len(), 1);
    let contig = &result.contigs[0];
    assert!(
        contig.sequence == reference
            || contig.sequence == gossamer_test_support::reverse_complement_seq(&reference)
    );
}

/// Scenario 5: a dead-end 10-base tip at low coverage attached to a
/// high-coverage trunk. `prune-tips --cutoff 5` removes the tip;
/// re-running the pass against the pruned graph leaves it unchanged.
#[test]
fn prune_tips_removes_dead_end_and_is_idempotent() {
    let trunk = b"ACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGCTAACGTTGGACGGC".to_vec();
    let reads = tip_reads(&trunk, 10, 50, 2);

    let build = build_config(15);
    let graph = build_graph(&reads, &build).unwrap();

    let prune_config = TipPruneConfig {
        cutoff: Some(5),
        relative_cutoff: None,
        iterate: 1,
        threads: 1,
    };
    let pruned = gossamer_assemble::passes::prune_tips(&graph, &prune_config).unwrap();
    assert!(pruned.count() < graph.count());

    let pruned_again = gossamer_assemble::passes::prune_tips(&pruned, &prune_config).unwrap();
    assert_eq!(pruned_again.count(), pruned.count());
}

/// Scenario 6: `SparseArray` rank/select/access cross-checked against
/// the brute-force oracle over a large universe with many random set
/// positions.
#[test]
fn sparse_array_matches_brute_force_oracle_on_random_queries() {
    let universe: u64 = 1_000_000_000_000;
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let mut positions: Vec<u64> = (0..1_000).map(|_| rng.random_range(0..universe)).collect();
    positions.sort_unstable();
    positions.dedup();

    let oracle = BruteForceSparse::new(universe, positions.clone());

    let mut builder = SparseArrayBuilder::new(universe);
    for &p in &positions {
        builder.push_back(p).unwrap();
    }
    let array: SparseArray = builder.end(universe).unwrap();

    assert_eq!(array.count(), oracle.count());
    for _ in 0..2_000 {
        let r = rng.random_range(0..oracle.count());
        assert_eq!(array.select(r), oracle.select(r));
    }
    for _ in 0..2_000 {
        let p = rng.random_range(0..universe);
        assert_eq!(array.access(p), oracle.access(p));
        assert_eq!(array.rank(p), oracle.rank(p));
    }
}

/// The edit-distance oracle agrees with the Tour Bus bubble comparison
/// on a simple pair, as a sanity check that both sides of the
/// adversarial check use the same metric.
#[test]
fn edit_distance_oracle_matches_known_single_substitution() {
    let a = b"ACGGCTAACGTTGGACG";
    let mut b = a.to_vec();
    b[8] = if b[8] == b'A' { b'C' } else { b'A' };
    assert_eq!(edit_distance(a, &b), 1);
}

/// Counting cross-check: the brute-force adjacency oracle's total
/// observation count must match the number of overlapping windows fed
/// into `BackyardHash` via the pipeline's asymmetric counting stage.
#[test]
fn brute_force_oracle_agrees_with_pipeline_edge_count_order_of_magnitude() {
    let reads = vec![b"ACGGCTAACGTTGGACGGCTAACGTTGGACG".to_vec(); 4];
    let oracle = BruteForceGraph::build(&reads, 15, true);

    let graph = build_graph(&reads, &build_config(15)).unwrap();
    assert_eq!(graph.count() as usize, oracle.edge_count() * 2);
}
