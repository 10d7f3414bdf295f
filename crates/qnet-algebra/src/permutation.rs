//! Permutations of circuit channels.
//!
//! A permutation of `n` channels is given by its image tuple: input channel
//! `j` is routed to output channel `perm[j]`.

use crate::error::{AlgebraError, AlgebraResult};

/// Whether `perm` is a permutation of `0..perm.len()`.
pub fn check_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &p in perm {
        if p >= perm.len() || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

fn validate(perm: &[usize]) -> AlgebraResult<()> {
    if check_permutation(perm) {
        Ok(())
    } else {
        Err(AlgebraError::BadPermutation(perm.to_vec()))
    }
}

/// The inverse permutation.
pub fn invert_permutation(perm: &[usize]) -> AlgebraResult<Vec<usize>> {
    validate(perm)?;
    let mut inverse = vec![0; perm.len()];
    for (j, &p) in perm.iter().enumerate() {
        inverse[p] = j;
    }
    Ok(inverse)
}

/// Reorder `sequence` so that element `j` of the result is
/// `sequence[perm[j]]`.
pub fn permute<T: Clone>(sequence: &[T], perm: &[usize]) -> AlgebraResult<Vec<T>> {
    if sequence.len() != perm.len() {
        return Err(AlgebraError::PermutationLength {
            sequence: sequence.len(),
            permutation: perm.len(),
        });
    }
    validate(perm)?;
    Ok(perm.iter().map(|&p| sequence[p].clone()).collect())
}

/// The permutation that applies `beta` first and then `alpha`.
pub fn compose_permutations(alpha: &[usize], beta: &[usize]) -> AlgebraResult<Vec<usize>> {
    validate(alpha)?;
    permute(alpha, beta)
}

/// Block-diagonal combination of two permutations, `a` acting on the first
/// channels.
pub fn concatenate_permutations(a: &[usize], b: &[usize]) -> AlgebraResult<Vec<usize>> {
    permutation_from_block_permutations([a, b])
}

/// Decompose a permutation into disjoint cycles.
///
/// Each cycle starts at its smallest element; cycles are ordered by that
/// element. Fixed points are cycles of length one.
pub fn permutation_to_disjoint_cycles(perm: &[usize]) -> AlgebraResult<Vec<Vec<usize>>> {
    validate(perm)?;
    let mut visited = vec![false; perm.len()];
    let mut cycles = Vec::new();
    for start in 0..perm.len() {
        if visited[start] {
            continue;
        }
        let mut cycle = Vec::new();
        let mut j = start;
        while !visited[j] {
            visited[j] = true;
            cycle.push(j);
            j = perm[j];
        }
        cycles.push(cycle);
    }
    Ok(cycles)
}

/// Build a permutation from disjoint cycles over `offset..`.
///
/// Every index between `offset` and the largest index mentioned must appear
/// in exactly one cycle.
pub fn permutation_from_disjoint_cycles(
    cycles: &[Vec<usize>],
    offset: usize,
) -> AlgebraResult<Vec<usize>> {
    let n: usize = cycles.iter().map(Vec::len).sum();
    let bad = || AlgebraError::BadPermutation(cycles.iter().flatten().copied().collect());
    let mut perm = vec![usize::MAX; n];
    for cycle in cycles {
        for (i, &c) in cycle.iter().enumerate() {
            let next = cycle[(i + 1) % cycle.len()];
            let (Some(from), Some(to)) = (c.checked_sub(offset), next.checked_sub(offset)) else {
                return Err(bad());
            };
            if from >= n || to >= n || perm[from] != usize::MAX {
                return Err(bad());
            }
            perm[from] = to;
        }
    }
    if check_permutation(&perm) {
        Ok(perm)
    } else {
        Err(bad())
    }
}

/// Split a permutation into the finest block-diagonal decomposition.
///
/// Each block is returned as a permutation of its own channels, starting at
/// zero.
pub fn permutation_to_block_permutations(perm: &[usize]) -> AlgebraResult<Vec<Vec<usize>>> {
    let cycles = permutation_to_disjoint_cycles(perm)?;
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    let mut block_start = 0;
    let mut block_end = 0;
    let mut current: Vec<Vec<usize>> = Vec::new();

    for cycle in cycles {
        let lo = cycle[0];
        let hi = cycle.iter().copied().max().unwrap_or(lo);
        if !current.is_empty() && lo > block_end {
            blocks.push(permutation_from_disjoint_cycles(&current, block_start)?);
            current.clear();
            block_start = lo;
        }
        block_end = block_end.max(hi);
        current.push(cycle);
    }
    if !current.is_empty() {
        blocks.push(permutation_from_disjoint_cycles(&current, block_start)?);
    }
    Ok(blocks)
}

/// Combine block permutations into a single block-diagonal permutation.
pub fn permutation_from_block_permutations<P: AsRef<[usize]>>(
    blocks: impl IntoIterator<Item = P>,
) -> AlgebraResult<Vec<usize>> {
    let mut perm = Vec::new();
    for block in blocks {
        let block = block.as_ref();
        validate(block)?;
        let offset = perm.len();
        perm.extend(block.iter().map(|&p| p + offset));
    }
    Ok(perm)
}

fn partial_sums(block_structure: &[usize]) -> Vec<usize> {
    let mut sums = Vec::with_capacity(block_structure.len() + 1);
    let mut acc = 0;
    sums.push(0);
    for &b in block_structure {
        acc += b;
        sums.push(acc);
    }
    sums
}

/// Expand a permutation of blocks into a permutation of channels.
///
/// Block `k` of size `block_structure[k]` is moved as a whole to block
/// position `block_perm[k]`.
pub fn full_block_perm(block_perm: &[usize], block_structure: &[usize]) -> AlgebraResult<Vec<usize>> {
    if block_perm.len() != block_structure.len() {
        return Err(AlgebraError::PermutationLength {
            sequence: block_structure.len(),
            permutation: block_perm.len(),
        });
    }
    let inverse = invert_permutation(block_perm)?;
    // sizes in target order
    let target_sizes: Vec<usize> = inverse.iter().map(|&k| block_structure[k]).collect();
    let target_offsets = partial_sums(&target_sizes);

    let mut perm = Vec::with_capacity(block_structure.iter().sum());
    for (k, &size) in block_structure.iter().enumerate() {
        let offset = target_offsets[block_perm[k]];
        perm.extend(offset..offset + size);
    }
    Ok(perm)
}

/// Factor a permutation into a permutation of blocks and permutations within
/// blocks.
///
/// Returns `(block_perm, within)`. Blocks are ordered by their smallest
/// image, and `within[k]` sorts the channels of block `k` by image. If `perm`
/// maps every block onto a contiguous range of outputs, applying `within` and
/// then moving the blocks by `block_perm` reproduces `perm`.
pub fn block_perm_and_perms_within_blocks(
    perm: &[usize],
    block_structure: &[usize],
) -> AlgebraResult<(Vec<usize>, Vec<Vec<usize>>)> {
    validate(perm)?;
    let offsets = partial_sums(block_structure);
    if offsets[block_structure.len()] != perm.len() {
        return Err(AlgebraError::IncompatibleBlockStructure {
            requested: block_structure.to_vec(),
            actual: vec![perm.len()],
        });
    }

    let images: Vec<&[usize]> = block_structure
        .iter()
        .enumerate()
        .map(|(k, &size)| &perm[offsets[k]..offsets[k] + size])
        .collect();

    let mut block_perm_inv: Vec<usize> = (0..images.len()).collect();
    block_perm_inv.sort_by_key(|&k| images[k].iter().copied().min().unwrap_or(usize::MAX));
    let block_perm = invert_permutation(&block_perm_inv)?;

    let mut within = Vec::with_capacity(images.len());
    for image in &images {
        let mut order: Vec<usize> = (0..image.len()).collect();
        order.sort_by_key(|&i| image[i]);
        within.push(invert_permutation(&order)?);
    }

    Ok((block_perm, within))
}

/// The permutation of `n` channels that routes each key of `mapping` to its
/// value and fills the remaining outputs with the remaining inputs in order.
pub fn map_signals(mapping: &[(usize, usize)], n: usize) -> AlgebraResult<Vec<usize>> {
    let mut perm = vec![usize::MAX; n];
    let mut taken = vec![false; n];
    for &(from, to) in mapping {
        for index in [from, to] {
            if index >= n {
                return Err(AlgebraError::ChannelOutOfRange { index, cdim: n });
            }
        }
        if perm[from] != usize::MAX || taken[to] {
            return Err(AlgebraError::BadPermutation(
                mapping.iter().flat_map(|&(a, b)| [a, b]).collect(),
            ));
        }
        perm[from] = to;
        taken[to] = true;
    }
    let mut free = (0..n).filter(|&t| !taken[t]);
    for p in &mut perm {
        if *p == usize::MAX {
            // counts of free inputs and free outputs agree
            *p = free.next().unwrap_or(usize::MAX);
        }
    }
    validate(&perm)?;
    Ok(perm)
}

/// The coarsest block structure refined by both `lhs` and `rhs`.
pub fn get_common_block_structure(lhs: &[usize], rhs: &[usize]) -> AlgebraResult<Vec<usize>> {
    let (total_l, total_r): (usize, usize) = (lhs.iter().sum(), rhs.iter().sum());
    if total_l != total_r {
        return Err(AlgebraError::IncompatibleBlockStructure {
            requested: lhs.to_vec(),
            actual: rhs.to_vec(),
        });
    }
    let right = partial_sums(rhs);
    let mut common = Vec::new();
    let mut last = 0;
    for boundary in partial_sums(lhs).into_iter().skip(1) {
        if boundary > last && right.binary_search(&boundary).is_ok() {
            common.push(boundary - last);
            last = boundary;
        }
    }
    Ok(common)
}
