//! Circuit algebra.
//!
//! A [`Circuit`] is a network of components with `cdim` bosonic input and
//! output channels. Circuits combine by
//!
//! - **series product** `A ◁ B` ([`Circuit::series_product`]): the outputs of
//!   `B` feed the inputs of `A`,
//! - **concatenation** `A ⊞ B` ([`Circuit::concatenation`]): the two circuits
//!   side by side,
//! - **feedback** `[A]_{k→l}` ([`Circuit::feedback`]): output `k` is fed back
//!   into input `l`.
//!
//! Constructors normalise their result: identities and empty circuits are
//! dropped, permutations are merged, series products of block-diagonal
//! circuits are decomposed block by block and permutations are pushed to the
//! right of reducible circuits. Feedback is resolved into series products
//! wherever the loop does not actually close on a component.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{AlgebraError, AlgebraResult};
use crate::permutation::{
    block_perm_and_perms_within_blocks, check_permutation, compose_permutations,
    concatenate_permutations, full_block_perm, get_common_block_structure, invert_permutation,
    map_signals, permutation_to_block_permutations,
};
use crate::rewrite::{BinaryRule, Memo, RuleSet, memoize};
use crate::slh::Slh;

/// A symbolic circuit expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Circuit {
    /// A named component.
    Symbol {
        /// Component name.
        name: String,
        /// Number of channels.
        cdim: usize,
    },
    /// A single straight-through channel.
    Identity,
    /// The circuit without channels.
    Zero,
    /// A non-trivial channel permutation; input `j` leaves on output `perm[j]`.
    Permutation(Vec<usize>),
    /// Series product, leftmost operand applied last.
    Series(Vec<Circuit>),
    /// Concatenation, operands in channel order.
    Concatenation(Vec<Circuit>),
    /// A feedback loop that could not be resolved.
    Feedback {
        /// The circuit inside the loop.
        circuit: Box<Circuit>,
        /// Output fed back.
        out_port: usize,
        /// Input receiving the loop.
        in_port: usize,
    },
    /// The series inverse of a circuit without closed form inverse.
    SeriesInverse(Box<Circuit>),
    /// A component given by its SLH model.
    Slh(Box<Slh>),
}

thread_local! {
    static SERIES_CACHE: RefCell<Memo<Vec<Circuit>, Circuit>> = RefCell::new(Memo::new());
    static CONCAT_CACHE: RefCell<Memo<Vec<Circuit>, Circuit>> = RefCell::new(Memo::new());
}

pub(crate) fn clear_cache() {
    SERIES_CACHE.with(|c| c.borrow_mut().clear());
    CONCAT_CACHE.with(|c| c.borrow_mut().clear());
}

static SERIES_RULES: RuleSet<Circuit, AlgebraError> = RuleSet::new(
    "series",
    &[
        BinaryRule {
            name: "permutation_series",
            apply: series_permutations,
        },
        BinaryRule {
            name: "slh_series",
            apply: series_slh,
        },
        BinaryRule {
            name: "tensor_decompose",
            apply: tensor_decompose_series,
        },
        BinaryRule {
            name: "factor_permutation",
            apply: factor_permutation_for_blocks,
        },
        BinaryRule {
            name: "series_inverse_right",
            apply: cancel_inverse_right,
        },
        BinaryRule {
            name: "series_inverse_left",
            apply: cancel_inverse_left,
        },
    ],
    |c| match c {
        Circuit::Series(ops) => ops,
        other => vec![other],
    },
    is_cid,
);

static CONCAT_RULES: RuleSet<Circuit, AlgebraError> = RuleSet::new(
    "concatenation",
    &[
        BinaryRule {
            name: "slh_concat",
            apply: concat_slh,
        },
        BinaryRule {
            name: "permutation_concat",
            apply: concat_permutations,
        },
        BinaryRule {
            name: "permutation_identity",
            apply: concat_permutation_identity,
        },
        BinaryRule {
            name: "identity_permutation",
            apply: concat_identity_permutation,
        },
        BinaryRule {
            name: "pull_permutations_both",
            apply: pull_permutations_both,
        },
        BinaryRule {
            name: "pull_permutation_left",
            apply: pull_permutation_left,
        },
        BinaryRule {
            name: "pull_permutation_right",
            apply: pull_permutation_right,
        },
    ],
    |c| match c {
        Circuit::Concatenation(ops) => ops,
        other => vec![other],
    },
    |c| matches!(c, Circuit::Zero),
);

/// The identity circuit on `n` channels.
pub fn cid(n: usize) -> Circuit {
    match n {
        0 => Circuit::Zero,
        1 => Circuit::Identity,
        n => Circuit::Concatenation(vec![Circuit::Identity; n]),
    }
}

/// Alias for [`cid`].
pub fn circuit_identity(n: usize) -> Circuit {
    cid(n)
}

fn is_cid(c: &Circuit) -> bool {
    *c == cid(c.cdim())
}

/// The permutation circuit with the given image tuple.
pub fn p_sigma(perm: &[usize]) -> AlgebraResult<Circuit> {
    Circuit::permutation(perm.to_vec())
}

/// The permutation circuit of [`map_signals`].
pub fn map_signals_circuit(mapping: &[(usize, usize)], n: usize) -> AlgebraResult<Circuit> {
    Circuit::permutation(map_signals(mapping, n)?)
}

impl Circuit {
    /// A named component with `cdim` channels.
    pub fn symbol(name: impl Into<String>, cdim: usize) -> Self {
        Circuit::Symbol {
            name: name.into(),
            cdim,
        }
    }

    /// A component given by its SLH model.
    pub fn slh(model: Slh) -> Self {
        Circuit::Slh(Box::new(model))
    }

    /// A channel permutation; the identity permutation gives [`cid`].
    pub fn permutation(perm: Vec<usize>) -> AlgebraResult<Self> {
        if !check_permutation(&perm) {
            return Err(AlgebraError::BadPermutation(perm));
        }
        if perm.iter().enumerate().all(|(j, &p)| j == p) {
            return Ok(cid(perm.len()));
        }
        Ok(Circuit::Permutation(perm))
    }

    /// Number of channels.
    pub fn cdim(&self) -> usize {
        match self {
            Circuit::Symbol { cdim, .. } => *cdim,
            Circuit::Identity => 1,
            Circuit::Zero => 0,
            Circuit::Permutation(perm) => perm.len(),
            Circuit::Series(ops) => ops.first().map_or(0, Circuit::cdim),
            Circuit::Concatenation(ops) => ops.iter().map(Circuit::cdim).sum(),
            Circuit::Feedback { circuit, .. } => circuit.cdim().saturating_sub(1),
            Circuit::SeriesInverse(inner) => inner.cdim(),
            Circuit::Slh(model) => model.cdim(),
        }
    }

    /// The finest decomposition of the channels into independent blocks.
    pub fn block_structure(&self) -> Vec<usize> {
        match self {
            Circuit::Zero => Vec::new(),
            Circuit::Concatenation(ops) => ops.iter().flat_map(Circuit::block_structure).collect(),
            Circuit::Permutation(perm) => permutation_to_block_permutations(perm)
                .map(|blocks| blocks.iter().map(Vec::len).collect())
                .unwrap_or_else(|_| vec![perm.len()]),
            Circuit::Series(ops) => {
                let mut structures = ops.iter().map(Circuit::block_structure);
                let first = structures.next().unwrap_or_default();
                structures
                    .try_fold(first, |acc, bs| get_common_block_structure(&acc, &bs))
                    .unwrap_or_else(|_| vec![self.cdim()])
            }
            Circuit::SeriesInverse(inner) => inner.block_structure(),
            other => vec![other.cdim()],
        }
    }

    /// The blocks of [`Circuit::block_structure`].
    pub fn blocks(&self) -> AlgebraResult<Vec<Circuit>> {
        self.get_blocks(&self.block_structure())
    }

    /// Split the circuit into independent blocks of the given sizes.
    ///
    /// Zero-size blocks are returned as [`Circuit::Zero`]. Fails if the
    /// circuit does not decompose along `block_structure`.
    pub fn get_blocks(&self, block_structure: &[usize]) -> AlgebraResult<Vec<Circuit>> {
        if block_structure.iter().sum::<usize>() != self.cdim() {
            return Err(self.incompatible(block_structure));
        }
        let nonzero: Vec<usize> = block_structure.iter().copied().filter(|&b| b > 0).collect();
        let mut blocks = self.nonempty_blocks(&nonzero)?.into_iter();
        Ok(block_structure
            .iter()
            .map(|&b| match b {
                0 => Circuit::Zero,
                _ => blocks.next().unwrap_or(Circuit::Zero),
            })
            .collect())
    }

    fn incompatible(&self, requested: &[usize]) -> AlgebraError {
        AlgebraError::IncompatibleBlockStructure {
            requested: requested.to_vec(),
            actual: self.block_structure(),
        }
    }

    fn nonempty_blocks(&self, bs: &[usize]) -> AlgebraResult<Vec<Circuit>> {
        match bs.len() {
            0 => return Ok(Vec::new()),
            1 => return Ok(vec![self.clone()]),
            _ => {}
        }
        match self {
            Circuit::Permutation(perm) => {
                let mut blocks = Vec::with_capacity(bs.len());
                let mut offset = 0;
                for &size in bs {
                    let range = offset..offset + size;
                    let images = &perm[range.clone()];
                    if images.iter().any(|p| !range.contains(p)) {
                        return Err(self.incompatible(bs));
                    }
                    blocks.push(Circuit::permutation(
                        images.iter().map(|p| p - offset).collect(),
                    )?);
                    offset += size;
                }
                Ok(blocks)
            }
            Circuit::Concatenation(ops) => {
                let mut fine = Vec::new();
                for op in ops {
                    fine.extend(op.blocks()?);
                }
                let mut fine = fine.into_iter();
                let mut blocks = Vec::with_capacity(bs.len());
                for &size in bs {
                    let mut group = Vec::new();
                    let mut width = 0;
                    while width < size {
                        let Some(next) = fine.next() else {
                            return Err(self.incompatible(bs));
                        };
                        width += next.cdim();
                        group.push(next);
                    }
                    if width != size {
                        return Err(self.incompatible(bs));
                    }
                    blocks.push(Circuit::concatenation(group)?);
                }
                Ok(blocks)
            }
            Circuit::Series(ops) => {
                let per_operand = ops
                    .iter()
                    .map(|op| op.get_blocks(bs))
                    .collect::<AlgebraResult<Vec<_>>>()?;
                (0..bs.len())
                    .map(|k| {
                        Circuit::series_product(per_operand.iter().map(|b| b[k].clone()).collect())
                    })
                    .collect()
            }
            Circuit::SeriesInverse(inner) => inner
                .get_blocks(bs)?
                .iter()
                .map(Circuit::series_inverse)
                .collect(),
            _ => Err(self.incompatible(bs)),
        }
    }

    /// Locate `channel` as `(index within its block, block index)`.
    pub fn index_in_block(&self, channel: usize) -> AlgebraResult<(usize, usize)> {
        let mut offset = 0;
        for (block, size) in self.block_structure().into_iter().enumerate() {
            if channel < offset + size {
                return Ok((channel - offset, block));
            }
            offset += size;
        }
        Err(AlgebraError::ChannelOutOfRange {
            index: channel,
            cdim: self.cdim(),
        })
    }

    /// Canonical series product; `operands[0]` is applied last.
    pub fn series_product(operands: Vec<Circuit>) -> AlgebraResult<Circuit> {
        let mut flat = Vec::with_capacity(operands.len());
        for op in operands {
            match op {
                Circuit::Series(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        let Some(cdim) = flat.first().map(Circuit::cdim) else {
            return Ok(Circuit::Zero);
        };
        if let Some(bad) = flat.iter().find(|op| op.cdim() != cdim) {
            return Err(AlgebraError::CircuitDimensionMismatch {
                expected: cdim,
                got: bad.cdim(),
            });
        }
        flat.retain(|op| !is_cid(op));
        match flat.len() {
            0 => return Ok(cid(cdim)),
            1 => return Ok(flat.remove(0)),
            _ => {}
        }
        memoize(&SERIES_CACHE, flat, |ops| {
            let mut ops = SERIES_RULES.apply(ops)?;
            Ok(match ops.len() {
                0 => cid(cdim),
                1 => ops.remove(0),
                _ => Circuit::Series(ops),
            })
        })
    }

    /// Canonical concatenation.
    pub fn concatenation(operands: Vec<Circuit>) -> AlgebraResult<Circuit> {
        let mut flat = Vec::with_capacity(operands.len());
        for op in operands {
            match op {
                Circuit::Concatenation(inner) => flat.extend(inner),
                Circuit::Zero => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => return Ok(Circuit::Zero),
            1 => return Ok(flat.remove(0)),
            _ => {}
        }
        memoize(&CONCAT_CACHE, flat, |ops| {
            let mut ops = CONCAT_RULES.apply(ops)?;
            Ok(match ops.len() {
                0 => Circuit::Zero,
                1 => ops.remove(0),
                _ => Circuit::Concatenation(ops),
            })
        })
    }

    /// `self ◁ rhs`.
    pub fn series(&self, rhs: &Circuit) -> AlgebraResult<Circuit> {
        Circuit::series_product(vec![self.clone(), rhs.clone()])
    }

    /// `self ⊞ rhs`.
    pub fn concat(&self, rhs: &Circuit) -> AlgebraResult<Circuit> {
        Circuit::concatenation(vec![self.clone(), rhs.clone()])
    }

    /// The inverse with respect to the series product.
    pub fn series_inverse(&self) -> AlgebraResult<Circuit> {
        match self {
            Circuit::Identity | Circuit::Zero => Ok(self.clone()),
            Circuit::Permutation(perm) => Circuit::permutation(invert_permutation(perm)?),
            Circuit::Series(ops) => Circuit::series_product(
                ops.iter()
                    .rev()
                    .map(Circuit::series_inverse)
                    .collect::<AlgebraResult<_>>()?,
            ),
            Circuit::Concatenation(ops) => Circuit::concatenation(
                ops.iter()
                    .map(Circuit::series_inverse)
                    .collect::<AlgebraResult<_>>()?,
            ),
            Circuit::SeriesInverse(inner) => Ok(inner.as_ref().clone()),
            Circuit::Slh(model) => Ok(Circuit::slh(model.series_inverse()?)),
            Circuit::Symbol { .. } | Circuit::Feedback { .. } => {
                Ok(Circuit::SeriesInverse(Box::new(self.clone())))
            }
        }
    }

    /// Feed output `out_port` back into input `in_port`.
    pub fn feedback(&self, out_port: usize, in_port: usize) -> AlgebraResult<Circuit> {
        let cdim = self.cdim();
        if cdim < 2 {
            return Err(AlgebraError::FeedbackDimension(cdim));
        }
        for index in [out_port, in_port] {
            if index >= cdim {
                return Err(AlgebraError::ChannelOutOfRange { index, cdim });
            }
        }
        debug!(cdim, out_port, in_port, "feedback");
        match self {
            Circuit::Permutation(perm) => permutation_feedback(perm, out_port, in_port),
            Circuit::Concatenation(_) => self.concatenation_feedback(out_port, in_port),
            Circuit::Slh(model) => Ok(Circuit::slh(model.feedback(out_port, in_port)?)),
            Circuit::Series(ops) => match series_feedback(ops, out_port, in_port)? {
                Some(resolved) => Ok(resolved),
                None => Ok(self.feedback_node(out_port, in_port)),
            },
            _ => Ok(self.feedback_node(out_port, in_port)),
        }
    }

    /// Feedback from the last output into the last input.
    pub fn feedback_last(&self) -> AlgebraResult<Circuit> {
        let last = self.cdim().saturating_sub(1);
        self.feedback(last, last)
    }

    fn feedback_node(&self, out_port: usize, in_port: usize) -> Circuit {
        Circuit::Feedback {
            circuit: Box::new(self.clone()),
            out_port,
            in_port,
        }
    }

    fn concatenation_feedback(&self, out_port: usize, in_port: usize) -> AlgebraResult<Circuit> {
        let n = self.cdim();
        let (out_index, out_block) = self.index_in_block(out_port)?;
        let (in_index, in_block) = self.index_in_block(in_port)?;
        let blocks = self.blocks()?;

        if in_block == out_block {
            let block = &blocks[out_block];
            let closed = match block {
                Circuit::Identity => Circuit::Zero,
                b => b.feedback(out_index, in_index)?,
            };
            let mut ops = blocks[..out_block].to_vec();
            ops.push(closed);
            ops.extend_from_slice(&blocks[out_block + 1..]);
            return Circuit::concatenation(ops);
        }

        // the loop runs from one block into another: an effective series product
        if in_block < out_block {
            let b1 = Circuit::concatenation(blocks[..out_block].to_vec())?;
            let b2 = Circuit::concatenation(blocks[out_block..].to_vec())?;
            let (m1, m2) = (b1.cdim(), b2.cdim());
            Circuit::series_product(vec![
                b1.concat(&cid(m2 - 1))?,
                map_signals_circuit(&[(out_port - 1, in_port)], n - 1)?,
                cid(m1 - 1).concat(&b2)?,
            ])
        } else {
            let b1 = Circuit::concatenation(blocks[..in_block].to_vec())?;
            let b2 = Circuit::concatenation(blocks[in_block..].to_vec())?;
            let (m1, m2) = (b1.cdim(), b2.cdim());
            Circuit::series_product(vec![
                cid(m1 - 1).concat(&b2)?,
                map_signals_circuit(&[(out_port, in_port - 1)], n - 1)?,
                b1.concat(&cid(m2 - 1))?,
            ])
        }
    }

    /// Replace sub-circuits according to `mapping` and rebuild canonically.
    pub fn substitute(&self, mapping: &[(Circuit, Circuit)]) -> AlgebraResult<Circuit> {
        if let Some((_, replacement)) = mapping.iter().find(|(k, _)| k == self) {
            return Ok(replacement.clone());
        }
        let all = |ops: &[Circuit]| {
            ops.iter()
                .map(|op| op.substitute(mapping))
                .collect::<AlgebraResult<Vec<_>>>()
        };
        match self {
            Circuit::Series(ops) => Circuit::series_product(all(ops)?),
            Circuit::Concatenation(ops) => Circuit::concatenation(all(ops)?),
            Circuit::Feedback {
                circuit,
                out_port,
                in_port,
            } => circuit.substitute(mapping)?.feedback(*out_port, *in_port),
            Circuit::SeriesInverse(inner) => inner.substitute(mapping)?.series_inverse(),
            _ => Ok(self.clone()),
        }
    }

    /// Convert to an SLH model. Fails on components without a model.
    pub fn to_slh(&self) -> AlgebraResult<Slh> {
        match self {
            Circuit::Symbol { .. } => Err(AlgebraError::CannotConvertToSlh(self.to_string())),
            Circuit::Identity => Ok(Slh::identity(1)),
            Circuit::Zero => Ok(Slh::identity(0)),
            Circuit::Permutation(perm) => Ok(Slh::permutation(perm)),
            Circuit::Series(ops) => {
                let mut models = ops.iter().map(Circuit::to_slh);
                let first = models.next().unwrap_or_else(|| Ok(Slh::identity(0)))?;
                models.try_fold(first, |acc, m| acc.series_with_slh(&m?))
            }
            Circuit::Concatenation(ops) => ops
                .iter()
                .try_fold(Slh::identity(0), |acc, op| acc.concatenate_slh(&op.to_slh()?)),
            Circuit::Feedback {
                circuit,
                out_port,
                in_port,
            } => circuit.to_slh()?.feedback(*out_port, *in_port),
            Circuit::SeriesInverse(inner) => inner.to_slh()?.series_inverse(),
            Circuit::Slh(model) => Ok(model.as_ref().clone()),
        }
    }
}

fn series_permutations(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Permutation(pa), Circuit::Permutation(pb)) = (a, b) else {
        return Ok(None);
    };
    Circuit::permutation(compose_permutations(pa, pb)?).map(Some)
}

fn series_slh(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Slh(sa), Circuit::Slh(sb)) = (a, b) else {
        return Ok(None);
    };
    Ok(Some(Circuit::slh(sa.series_with_slh(sb)?)))
}

/// Series products of block-diagonal circuits split into blocks.
fn tensor_decompose_series(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    if matches!(b, Circuit::Permutation(_)) {
        return Ok(None);
    }
    let common = get_common_block_structure(&a.block_structure(), &b.block_structure())?;
    if common.len() < 2 {
        return Ok(None);
    }
    let blocks = a
        .get_blocks(&common)?
        .into_iter()
        .zip(b.get_blocks(&common)?)
        .map(|(x, y)| x.series(&y))
        .collect::<AlgebraResult<Vec<_>>>()?;
    Circuit::concatenation(blocks).map(Some)
}

fn factor_permutation_for_blocks(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let Circuit::Permutation(perm) = a else {
        return Ok(None);
    };
    if b.block_structure().len() < 2 {
        return Ok(None);
    }
    let (new_lhs, permuted_rhs, new_rhs) = factorize_for_rhs(perm, b)?;
    if new_lhs == *a {
        return Ok(None);
    }
    Circuit::series_product(vec![new_lhs, permuted_rhs, new_rhs]).map(Some)
}

fn cancel_inverse_right(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    Ok(match b {
        Circuit::SeriesInverse(inner) if **inner == *a => Some(cid(a.cdim())),
        _ => None,
    })
}

fn cancel_inverse_left(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    Ok(match a {
        Circuit::SeriesInverse(inner) if **inner == *b => Some(cid(b.cdim())),
        _ => None,
    })
}

/// Push the permutation `perm` through the block-diagonal circuit `rhs`.
///
/// Returns `(new_lhs, permuted_rhs, new_rhs)` with
/// `perm ◁ rhs == new_lhs ◁ permuted_rhs ◁ new_rhs`, where `new_rhs` moves
/// whole blocks, `permuted_rhs` is `rhs` with its blocks reordered and
/// absorbing the permutations within blocks, and `new_lhs` is what remains of
/// `perm`.
pub fn factorize_for_rhs(
    perm: &[usize],
    rhs: &Circuit,
) -> AlgebraResult<(Circuit, Circuit, Circuit)> {
    let bs = rhs.block_structure();
    let (block_perm, within) = block_perm_and_perms_within_blocks(perm, &bs)?;
    let new_rhs = Circuit::permutation(full_block_perm(&block_perm, &bs)?)?;

    let within_blocks = within
        .into_iter()
        .map(Circuit::permutation)
        .collect::<AlgebraResult<Vec<_>>>()?;
    let within_circuit = Circuit::concatenation(within_blocks.clone())?;

    let rhs_blocks = rhs.get_blocks(&bs)?;
    let summands = invert_permutation(&block_perm)?
        .into_iter()
        .map(|p| within_blocks[p].series(&rhs_blocks[p]))
        .collect::<AlgebraResult<Vec<_>>>()?;
    let permuted_rhs = Circuit::concatenation(summands)?;

    let new_lhs = Circuit::series_product(vec![
        Circuit::Permutation(perm.to_vec()),
        within_circuit.series_inverse()?,
        new_rhs.series_inverse()?,
    ])?;
    Ok((new_lhs, permuted_rhs, new_rhs))
}

fn concat_slh(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Slh(sa), Circuit::Slh(sb)) = (a, b) else {
        return Ok(None);
    };
    Ok(Some(Circuit::slh(sa.concatenate_slh(sb)?)))
}

fn concat_permutations(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Permutation(pa), Circuit::Permutation(pb)) = (a, b) else {
        return Ok(None);
    };
    Circuit::permutation(concatenate_permutations(pa, pb)?).map(Some)
}

fn concat_permutation_identity(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Permutation(pa), Circuit::Identity) = (a, b) else {
        return Ok(None);
    };
    Circuit::permutation(concatenate_permutations(pa, &[0])?).map(Some)
}

fn concat_identity_permutation(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Circuit::Identity, Circuit::Permutation(pb)) = (a, b) else {
        return Ok(None);
    };
    Circuit::permutation(concatenate_permutations(&[0], pb)?).map(Some)
}

/// Split `A ◁ … ◁ P` into the series product of the leading operands and the
/// trailing permutation `P`.
fn split_trailing_permutation(c: &Circuit) -> AlgebraResult<Option<(Circuit, Circuit)>> {
    let Circuit::Series(ops) = c else {
        return Ok(None);
    };
    let Some((last @ Circuit::Permutation(_), rest)) = ops.split_last() else {
        return Ok(None);
    };
    Ok(Some((Circuit::series_product(rest.to_vec())?, last.clone())))
}

fn pull_permutations_both(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let (Some((a1, pa)), Some((b1, pb))) =
        (split_trailing_permutation(a)?, split_trailing_permutation(b)?)
    else {
        return Ok(None);
    };
    a1.concat(&b1)?.series(&pa.concat(&pb)?).map(Some)
}

fn pull_permutation_left(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let Some((a1, pa)) = split_trailing_permutation(a)? else {
        return Ok(None);
    };
    a1.concat(b)?.series(&pa.concat(&cid(b.cdim()))?).map(Some)
}

fn pull_permutation_right(a: &Circuit, b: &Circuit) -> AlgebraResult<Option<Circuit>> {
    let Some((b1, pb)) = split_trailing_permutation(b)? else {
        return Ok(None);
    };
    a.concat(&b1)?.series(&cid(a.cdim()).concat(&pb)?).map(Some)
}

fn permutation_feedback(perm: &[usize], out_port: usize, in_port: usize) -> AlgebraResult<Circuit> {
    let reduced = perm
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != in_port)
        .map(|(_, &target)| {
            let target = if target == out_port { perm[in_port] } else { target };
            if target > out_port { target - 1 } else { target }
        })
        .collect();
    Circuit::permutation(reduced)
}

/// Solve `m(out→n−1) ◁ perm == (reduced ⊞ cid(1)) ◁ m(out_inv→n−1)`.
fn factor_lhs(perm: &[usize], out_port: usize) -> AlgebraResult<(usize, Circuit)> {
    let n = perm.len();
    let out_inv = invert_permutation(perm)?[out_port];
    let to_last = map_signals(&[(out_port, n - 1)], n)?;
    let from_last = map_signals(&[(n - 1, out_inv)], n)?;
    let reduced = compose_permutations(&compose_permutations(&to_last, perm)?, &from_last)?;
    Ok((out_inv, Circuit::permutation(reduced[..n - 1].to_vec())?))
}

/// Solve `perm ◁ m(n−1→in) == m(n−1→in_im) ◁ (reduced ⊞ cid(1))`.
fn factor_rhs(perm: &[usize], in_port: usize) -> AlgebraResult<(usize, Circuit)> {
    let n = perm.len();
    let in_im = perm[in_port];
    let to_last = map_signals(&[(in_im, n - 1)], n)?;
    let from_last = map_signals(&[(n - 1, in_port)], n)?;
    let reduced = compose_permutations(&compose_permutations(&to_last, perm)?, &from_last)?;
    Ok((in_im, Circuit::permutation(reduced[..n - 1].to_vec())?))
}

/// Split a circuit around the block containing `channel` into
/// `(before, block, after)` and their widths.
fn three_blocks(c: &Circuit, channel: usize) -> AlgebraResult<([Circuit; 3], [usize; 3])> {
    let (_, index) = c.index_in_block(channel)?;
    let bs = c.block_structure();
    let widths = [
        bs[..index].iter().sum(),
        bs[index],
        bs[index + 1..].iter().sum(),
    ];
    let parts: [Circuit; 3] = c
        .get_blocks(&widths)?
        .try_into()
        .map_err(|_| c.incompatible(&widths))?;
    Ok((parts, widths))
}

fn series_feedback(
    ops: &[Circuit],
    out_port: usize,
    in_port: usize,
) -> AlgebraResult<Option<Circuit>> {
    let (Some((first, tail)), Some((last, head))) = (ops.split_first(), ops.split_last()) else {
        return Ok(None);
    };

    if let Circuit::Permutation(perm) = first {
        let (out_inv, reduced) = factor_lhs(perm, out_port)?;
        let inner = Circuit::series_product(tail.to_vec())?.feedback(out_inv, in_port)?;
        return reduced.series(&inner).map(Some);
    }

    if let Circuit::Concatenation(_) = first {
        let ([before, block, after], [nbefore, nblock, nafter]) = three_blocks(first, out_port)?;
        if before != cid(nbefore) || after != cid(nafter) {
            let outer = Circuit::concatenation(vec![before, cid(nblock - 1), after])?;
            let inner_lhs = Circuit::concatenation(vec![cid(nbefore), block, cid(nafter)])?;
            let mut inner = vec![inner_lhs];
            inner.extend_from_slice(tail);
            let loop_ = Circuit::series_product(inner)?.feedback(out_port, in_port)?;
            return outer.series(&loop_).map(Some);
        }
    }

    if let Circuit::Permutation(perm) = last {
        let (in_im, reduced) = factor_rhs(perm, in_port)?;
        let inner = Circuit::series_product(head.to_vec())?.feedback(out_port, in_im)?;
        return inner.series(&reduced).map(Some);
    }

    if let Circuit::Concatenation(_) = last {
        let ([before, block, after], [nbefore, nblock, nafter]) = three_blocks(last, in_port)?;
        if before != cid(nbefore) || after != cid(nafter) {
            let outer = Circuit::concatenation(vec![before, cid(nblock - 1), after])?;
            let inner_rhs = Circuit::concatenation(vec![cid(nbefore), block, cid(nafter)])?;
            let mut inner = head.to_vec();
            inner.push(inner_rhs);
            let loop_ = Circuit::series_product(inner)?.feedback(out_port, in_port)?;
            return loop_.series(&outer).map(Some);
        }
    }

    Ok(None)
}

/// A connection from an output port of one component to an input port of
/// another, each given as `(component index, port)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source `(component, output port)`.
    pub from: (usize, usize),
    /// Target `(component, input port)`.
    pub to: (usize, usize),
}

impl Connection {
    /// Create a connection.
    pub fn new(from: (usize, usize), to: (usize, usize)) -> Self {
        Self { from, to }
    }
}

/// Wire `components` together.
///
/// The components are concatenated, the connected ports are routed to the
/// last channels and every connection is closed with a feedback loop.
#[instrument(skip_all, fields(components = components.len(), connections = connections.len()))]
pub fn connect(components: &[Circuit], connections: &[Connection]) -> AlgebraResult<Circuit> {
    let (routed, nfb) = route_connections(components, connections)?;
    let mut circuit = routed;
    for _ in 0..nfb {
        circuit = circuit.feedback_last()?;
    }
    debug!(cdim = circuit.cdim(), "connected");
    Ok(circuit)
}

/// Like [`connect`], but converts to an SLH model before closing the loops.
#[instrument(skip_all, fields(components = components.len(), connections = connections.len()))]
pub fn connect_to_slh(components: &[Circuit], connections: &[Connection]) -> AlgebraResult<Slh> {
    let (routed, nfb) = route_connections(components, connections)?;
    let mut model = routed.to_slh()?;
    for _ in 0..nfb {
        let last = model.cdim().saturating_sub(1);
        model = model.feedback(last, last)?.expand();
    }
    Ok(model)
}

fn route_connections(
    components: &[Circuit],
    connections: &[Connection],
) -> AlgebraResult<(Circuit, usize)> {
    let mut offsets = Vec::with_capacity(components.len());
    let mut n = 0;
    for c in components {
        offsets.push(n);
        n += c.cdim();
    }
    let nfb = connections.len();
    if nfb > n {
        return Err(AlgebraError::ChannelOutOfRange { index: nfb, cdim: n });
    }

    let port = |(component, port): (usize, usize)| -> AlgebraResult<usize> {
        let c = components
            .get(component)
            .ok_or(AlgebraError::ComponentOutOfRange {
                index: component,
                count: components.len(),
            })?;
        if port >= c.cdim() {
            return Err(AlgebraError::ChannelOutOfRange {
                index: port,
                cdim: c.cdim(),
            });
        }
        Ok(offsets[component] + port)
    };

    let mut imap = Vec::with_capacity(nfb);
    let mut omap = Vec::with_capacity(nfb);
    for (k, connection) in connections.iter().enumerate() {
        let slot = n - nfb + k;
        omap.push((port(connection.from)?, slot));
        imap.push((slot, port(connection.to)?));
    }

    let combined = Circuit::concatenation(components.to_vec())?;
    let routed = Circuit::series_product(vec![
        map_signals_circuit(&omap, n)?,
        combined,
        map_signals_circuit(&imap, n)?,
    ])?;
    Ok((routed, nfb))
}

fn write_joined(f: &mut fmt::Formatter<'_>, ops: &[Circuit], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{op}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Circuit::Symbol { name, .. } => write!(f, "{name}"),
            Circuit::Identity => write!(f, "cid(1)"),
            Circuit::Zero => write!(f, "cid(0)"),
            Circuit::Permutation(perm) => {
                let images: Vec<String> = perm.iter().map(usize::to_string).collect();
                write!(f, "P_sigma({})", images.join(", "))
            }
            Circuit::Series(ops) => write_joined(f, ops, "<<"),
            Circuit::Concatenation(ops) => {
                if is_cid(self) {
                    write!(f, "cid({})", ops.len())
                } else {
                    write_joined(f, ops, "+")
                }
            }
            Circuit::Feedback {
                circuit,
                out_port,
                in_port,
            } => write!(f, "[{circuit}]_({out_port}->{in_port})"),
            Circuit::SeriesInverse(inner) => write!(f, "[{inner}]^(-1)"),
            Circuit::Slh(model) => write!(f, "{model}"),
        }
    }
}
