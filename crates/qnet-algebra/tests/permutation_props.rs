//! Property-based tests for permutation utilities.

use proptest::prelude::*;
use qnet_algebra::permutation::{
    check_permutation, compose_permutations, invert_permutation, permutation_from_block_permutations,
    permutation_from_disjoint_cycles, permutation_to_block_permutations,
    permutation_to_disjoint_cycles, permute,
};
use qnet_algebra::{Circuit, p_sigma};

/// Random permutations of 1 to 9 channels.
fn arb_permutation() -> impl Strategy<Value = Vec<usize>> {
    (1_usize..=9).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #[test]
    fn generated_permutations_are_valid(p in arb_permutation()) {
        prop_assert!(check_permutation(&p));
    }

    #[test]
    fn inverse_composes_to_identity(p in arb_permutation()) {
        let inv = invert_permutation(&p).unwrap();
        let identity: Vec<usize> = (0..p.len()).collect();
        prop_assert_eq!(compose_permutations(&inv, &p).unwrap(), identity.clone());
        prop_assert_eq!(compose_permutations(&p, &inv).unwrap(), identity);
    }

    #[test]
    fn permute_is_undone_by_inverse(p in arb_permutation()) {
        let seq: Vec<String> = (0..p.len()).map(|i| format!("s{i}")).collect();
        let inv = invert_permutation(&p).unwrap();
        let back = permute(&permute(&seq, &p).unwrap(), &inv).unwrap();
        prop_assert_eq!(back, seq);
    }

    #[test]
    fn cycles_recompose(p in arb_permutation()) {
        let cycles = permutation_to_disjoint_cycles(&p).unwrap();
        prop_assert_eq!(cycles.iter().map(Vec::len).sum::<usize>(), p.len());
        prop_assert_eq!(permutation_from_disjoint_cycles(&cycles, 0).unwrap(), p);
    }

    #[test]
    fn blocks_recompose(p in arb_permutation()) {
        let blocks = permutation_to_block_permutations(&p).unwrap();
        prop_assert!(blocks.iter().all(|b| check_permutation(b)));
        prop_assert_eq!(permutation_from_block_permutations(&blocks).unwrap(), p);
    }

    #[test]
    fn permutation_circuit_cancels_its_inverse(p in arb_permutation()) {
        let circuit = p_sigma(&p).unwrap();
        let product = circuit.series(&circuit.series_inverse().unwrap()).unwrap();
        prop_assert_eq!(product, qnet_algebra::cid(p.len()));
        prop_assert_eq!(circuit.cdim(), p.len());
        prop_assert!(!matches!(circuit, Circuit::Series(_)));
    }
}
