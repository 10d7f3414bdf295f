//! Permutation command implementation.

use anyhow::Result;
use console::style;

use qnet_algebra::permutation::{
    invert_permutation, permutation_to_block_permutations, permutation_to_disjoint_cycles,
};
use qnet_algebra::p_sigma;

/// Summary of a channel permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationReport {
    /// Disjoint cycles, each starting at its smallest channel.
    pub cycles: Vec<Vec<usize>>,
    /// Sizes of the finest block decomposition.
    pub block_structure: Vec<usize>,
    /// The inverse image tuple.
    pub inverse: Vec<usize>,
}

/// Analyse the permutation with the given image tuple.
pub fn analyse(image: &[usize]) -> Result<PermutationReport> {
    let inverse = invert_permutation(image)?;
    let cycles = permutation_to_disjoint_cycles(image)?;
    let block_structure = permutation_to_block_permutations(image)?
        .iter()
        .map(Vec::len)
        .collect();
    Ok(PermutationReport {
        cycles,
        block_structure,
        inverse,
    })
}

/// Execute the permutation command.
pub fn execute(image: &[usize]) -> Result<()> {
    let report = analyse(image)?;
    let circuit = p_sigma(image)?;

    println!("{} {}", style("Permutation").cyan().bold(), circuit);
    let cycles: Vec<String> = report
        .cycles
        .iter()
        .filter(|c| c.len() > 1)
        .map(|c| {
            let inner: Vec<String> = c.iter().map(ToString::to_string).collect();
            format!("({})", inner.join(" "))
        })
        .collect();
    if cycles.is_empty() {
        println!("  Cycles:  {}", style("identity").dim());
    } else {
        println!("  Cycles:  {}", cycles.join(""));
    }
    println!("  Blocks:  {:?}", report.block_structure);
    println!("  Inverse: {:?}", report.inverse);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyse() {
        let report = analyse(&[0, 1, 2, 5, 6, 3, 4]).unwrap();
        assert_eq!(report.block_structure, vec![1, 1, 1, 4]);
        assert_eq!(report.cycles, vec![vec![0], vec![1], vec![2], vec![3, 5], vec![4, 6]]);
        assert_eq!(report.inverse, vec![0, 1, 2, 5, 6, 3, 4]);
    }

    #[test]
    fn test_analyse_rejects_non_permutations() {
        assert!(analyse(&[0, 0]).is_err());
        assert!(analyse(&[2, 0]).is_err());
    }
}
