//! State (ket) algebra.
//!
//! Kets are built through [`Ket::sum`], [`Ket::tensor_product`],
//! [`Ket::scalar_times`] and [`Ket::apply`]. Applying an operator resolves
//! the known actions of local operators on basis and coherent states and
//! leaves everything else as an [`Ket::OperatorTimes`] node.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{AlgebraError, AlgebraResult};
use crate::hilbert::{HilbertSpace, LocalSpace};
use crate::operator::{LocalOperator, Operator};
use crate::scalar::Scalar;

/// A symbolic state vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ket {
    /// The zero vector.
    Zero,
    /// The unit vector of the trivial space.
    Trivial,
    /// An unspecified state.
    Symbol {
        /// Name of the state.
        label: String,
        /// Space of the state.
        space: HilbertSpace,
    },
    /// A basis state of a local space.
    Basis {
        /// The local space.
        space: LocalSpace,
        /// Basis label.
        label: String,
    },
    /// A coherent state `|α⟩`.
    Coherent {
        /// The local space.
        space: LocalSpace,
        /// Amplitude `α`.
        amplitude: Scalar,
    },
    /// A scalar multiple of a ket that is not a multiple itself.
    ScalarTimes(Scalar, Box<Ket>),
    /// An operator application that could not be resolved.
    OperatorTimes(Operator, Box<Ket>),
    /// A tensor product of kets on disjoint spaces, sorted by space.
    Tensor(Vec<Ket>),
    /// A sum of kets on the same space, sorted.
    Plus(Vec<Ket>),
}

impl Ket {
    /// An unspecified state.
    pub fn symbol(label: impl Into<String>, space: impl Into<HilbertSpace>) -> Self {
        Ket::Symbol {
            label: label.into(),
            space: space.into(),
        }
    }

    /// The basis state with the given label.
    pub fn basis(space: impl Into<LocalSpace>, label: impl ToString) -> AlgebraResult<Self> {
        let space = space.into();
        let label = label.to_string();
        space.basis_index(&label)?;
        Ok(Ket::Basis { space, label })
    }

    /// The basis state at position `index`.
    pub fn basis_at(space: impl Into<LocalSpace>, index: usize) -> AlgebraResult<Self> {
        let space = space.into();
        let label = space.basis_label(index)?;
        Ok(Ket::Basis { space, label })
    }

    /// A coherent state.
    pub fn coherent(space: impl Into<LocalSpace>, amplitude: impl Into<Scalar>) -> Self {
        Ket::Coherent {
            space: space.into(),
            amplitude: amplitude.into(),
        }
    }

    /// The space of the state.
    pub fn space(&self) -> HilbertSpace {
        match self {
            Ket::Zero => HilbertSpace::Full,
            Ket::Trivial => HilbertSpace::Trivial,
            Ket::Symbol { space, .. } => space.clone(),
            Ket::Basis { space, .. } | Ket::Coherent { space, .. } => space.clone().into(),
            Ket::ScalarTimes(_, ket) => ket.space(),
            Ket::OperatorTimes(op, ket) => op.space().tensor(&ket.space()),
            Ket::Tensor(factors) => factors
                .iter()
                .fold(HilbertSpace::Trivial, |acc, k| acc.tensor(&k.space())),
            Ket::Plus(terms) => terms.first().map_or(HilbertSpace::Trivial, Ket::space),
        }
    }

    fn split_coefficient(self) -> (Scalar, Ket) {
        match self {
            Ket::ScalarTimes(c, ket) => (c, *ket),
            other => (Scalar::one(), other),
        }
    }

    /// Canonical scalar multiple.
    pub fn scalar_times(coeff: Scalar, ket: Ket) -> Ket {
        if coeff.is_zero() {
            return Ket::Zero;
        }
        match ket {
            Ket::Zero => Ket::Zero,
            ket if coeff.is_one() => ket,
            Ket::ScalarTimes(c, inner) => Self::scalar_times(coeff * c, *inner),
            ket => Ket::ScalarTimes(coeff, Box::new(ket)),
        }
    }

    /// Canonical sum. All non-zero terms must share one space.
    pub fn sum(terms: impl IntoIterator<Item = Ket>) -> AlgebraResult<Ket> {
        let mut pending: Vec<Ket> = terms.into_iter().collect();
        pending.reverse();
        let mut space: Option<HilbertSpace> = None;
        let mut collected: Vec<(Ket, Scalar)> = Vec::new();
        while let Some(term) = pending.pop() {
            match term {
                Ket::Zero => continue,
                Ket::Plus(inner) => {
                    pending.extend(inner.into_iter().rev());
                    continue;
                }
                term => {
                    let term_space = term.space();
                    match &space {
                        Some(s) if *s != term_space => {
                            return Err(AlgebraError::UnequalSpaces {
                                lhs: s.to_string(),
                                rhs: term_space.to_string(),
                            });
                        }
                        Some(_) => {}
                        None => space = Some(term_space),
                    }
                    let (coeff, ket) = term.split_coefficient();
                    match collected.iter_mut().find(|(k, _)| *k == ket) {
                        Some((_, c)) => *c = c.clone() + coeff,
                        None => collected.push((ket, coeff)),
                    }
                }
            }
        }

        let mut terms: Vec<Ket> = collected
            .into_iter()
            .map(|(k, c)| Self::scalar_times(c, k))
            .filter(|k| *k != Ket::Zero)
            .collect();
        terms.sort();
        Ok(match terms.len() {
            0 => Ket::Zero,
            1 => terms.remove(0),
            _ => Ket::Plus(terms),
        })
    }

    /// Canonical tensor product. Factor spaces must be pairwise disjoint.
    pub fn tensor_product(factors: impl IntoIterator<Item = Ket>) -> AlgebraResult<Ket> {
        let mut coeff = Scalar::one();
        let mut flat: Vec<Ket> = Vec::new();
        let mut pending: Vec<Ket> = factors.into_iter().collect();
        pending.reverse();
        while let Some(factor) = pending.pop() {
            match factor {
                Ket::Zero => return Ok(Ket::Zero),
                Ket::Trivial => {}
                Ket::Tensor(inner) => pending.extend(inner.into_iter().rev()),
                Ket::ScalarTimes(c, inner) => {
                    coeff = coeff * c;
                    pending.push(*inner);
                }
                other => flat.push(other),
            }
        }

        let mut space = HilbertSpace::Trivial;
        for factor in &flat {
            let factor_space = factor.space();
            if !space.is_disjoint(&factor_space) {
                return Err(AlgebraError::OverlappingSpaces {
                    lhs: space.to_string(),
                    rhs: factor_space.to_string(),
                });
            }
            space = space.tensor(&factor_space);
        }

        flat.sort_by_key(Ket::space);
        let product = match flat.len() {
            0 => Ket::Trivial,
            1 => flat.remove(0),
            _ => Ket::Tensor(flat),
        };
        Ok(Self::scalar_times(coeff, product))
    }

    /// Apply `op` to `ket`.
    ///
    /// The operator must act within the space of the ket.
    pub fn apply(op: &Operator, ket: &Ket) -> AlgebraResult<Ket> {
        match (op, ket) {
            (Operator::Zero, _) | (_, Ket::Zero) => return Ok(Ket::Zero),
            (Operator::Identity, _) => return Ok(ket.clone()),
            _ => {}
        }
        let (op_space, ket_space) = (op.space(), ket.space());
        if !op_space.is_subspace_of(&ket_space) {
            return Err(AlgebraError::UnequalSpaces {
                lhs: op_space.to_string(),
                rhs: ket_space.to_string(),
            });
        }

        match (op, ket) {
            (_, Ket::ScalarTimes(c, inner)) => {
                Ok(Self::scalar_times(c.clone(), Self::apply(op, inner)?))
            }
            (_, Ket::Plus(terms)) => Self::sum(
                terms
                    .iter()
                    .map(|t| Self::apply(op, t))
                    .collect::<AlgebraResult<Vec<_>>>()?,
            ),
            (Operator::ScalarTimes(c, inner), _) => {
                Ok(Self::scalar_times(c.clone(), Self::apply(inner, ket)?))
            }
            (Operator::Plus(ops), _) => Self::sum(
                ops.iter()
                    .map(|o| Self::apply(o, ket))
                    .collect::<AlgebraResult<Vec<_>>>()?,
            ),
            (Operator::Times(ops), _) => ops
                .iter()
                .rev()
                .try_fold(ket.clone(), |acc, o| Self::apply(o, &acc)),
            (_, Ket::OperatorTimes(inner_op, inner)) => Ok(Ket::OperatorTimes(
                Operator::product([op.clone(), inner_op.clone()]),
                inner.clone(),
            )),
            (_, Ket::Tensor(factors)) => {
                let Some(pos) = factors.iter().position(|f| op_space.is_subspace_of(&f.space()))
                else {
                    return Ok(Ket::OperatorTimes(op.clone(), Box::new(ket.clone())));
                };
                let mut factors = factors.clone();
                factors[pos] = Self::apply(op, &factors[pos])?;
                Self::tensor_product(factors)
            }
            (Operator::Local { op: local, .. }, _) => match local_action(local, ket)? {
                Some(result) => {
                    trace!(op = %local, "resolved local action");
                    Ok(result)
                }
                None => Ok(Ket::OperatorTimes(op.clone(), Box::new(ket.clone()))),
            },
            _ => Ok(Ket::OperatorTimes(op.clone(), Box::new(ket.clone()))),
        }
    }

    /// `self + other`.
    pub fn plus(&self, other: &Ket) -> AlgebraResult<Ket> {
        Self::sum([self.clone(), other.clone()])
    }

    /// `self − other`.
    pub fn minus(&self, other: &Ket) -> AlgebraResult<Ket> {
        Self::sum([self.clone(), -other.clone()])
    }

    /// `self ⊗ other`.
    pub fn tensor(&self, other: &Ket) -> AlgebraResult<Ket> {
        Self::tensor_product([self.clone(), other.clone()])
    }

    /// `coeff · self`.
    pub fn scaled(&self, coeff: Scalar) -> Ket {
        Self::scalar_times(coeff, self.clone())
    }

    /// Distribute tensor products and operator applications over sums.
    pub fn expand(&self) -> AlgebraResult<Ket> {
        match self {
            Ket::Plus(terms) => Self::sum(
                terms
                    .iter()
                    .map(Ket::expand)
                    .collect::<AlgebraResult<Vec<_>>>()?,
            ),
            Ket::ScalarTimes(c, inner) => Ok(Self::scalar_times(c.clone(), inner.expand()?)),
            Ket::OperatorTimes(op, inner) => Self::apply(&op.expand(), &inner.expand()?),
            Ket::Tensor(factors) => {
                let mut terms = vec![Ket::Trivial];
                for factor in factors {
                    let summands = match factor.expand()? {
                        Ket::Plus(inner) => inner,
                        other => vec![other],
                    };
                    let mut next = Vec::with_capacity(terms.len() * summands.len());
                    for t in &terms {
                        for s in &summands {
                            next.push(t.tensor(s)?);
                        }
                    }
                    terms = next;
                }
                Self::sum(terms)
            }
            _ => Ok(self.clone()),
        }
    }
}

/// The action of a local operator on a basis or coherent state of its space.
fn local_action(op: &LocalOperator, ket: &Ket) -> AlgebraResult<Option<Ket>> {
    let scaled = |c: f64, k: Ket| Ket::scalar_times(Scalar::real(c), k);
    match (op, ket) {
        (LocalOperator::Create, Ket::Basis { space, label }) => {
            let n = space.basis_index(label)?;
            if space.dimension().is_some_and(|d| n + 1 >= d) {
                return Ok(Some(Ket::Zero));
            }
            let raised = Ket::basis_at(space.clone(), n + 1)?;
            Ok(Some(scaled(((n + 1) as f64).sqrt(), raised)))
        }
        (LocalOperator::Destroy, Ket::Basis { space, label }) => {
            let n = space.basis_index(label)?;
            if n == 0 {
                return Ok(Some(Ket::Zero));
            }
            let lowered = Ket::basis_at(space.clone(), n - 1)?;
            Ok(Some(scaled((n as f64).sqrt(), lowered)))
        }
        (LocalOperator::Destroy, Ket::Coherent { amplitude, .. }) => {
            Ok(Some(Ket::scalar_times(amplitude.clone(), ket.clone())))
        }
        (LocalOperator::Jz, Ket::Basis { space, label }) => {
            let m = space.magnetic_number(label)?;
            Ok(Some(scaled(m, ket.clone())))
        }
        (LocalOperator::Jplus, Ket::Basis { space, label }) => {
            let index = space.basis_index(label)?;
            if space.dimension().is_some_and(|d| index + 1 >= d) {
                return Ok(Some(Ket::Zero));
            }
            let (j, m) = (space.spin_j()?, space.magnetic_number(label)?);
            let raised = Ket::basis_at(space.clone(), index + 1)?;
            Ok(Some(scaled((j * (j + 1.0) - m * (m + 1.0)).sqrt(), raised)))
        }
        (LocalOperator::Jminus, Ket::Basis { space, label }) => {
            let index = space.basis_index(label)?;
            if index == 0 {
                return Ok(Some(Ket::Zero));
            }
            let (j, m) = (space.spin_j()?, space.magnetic_number(label)?);
            let lowered = Ket::basis_at(space.clone(), index - 1)?;
            Ok(Some(scaled((j * (j + 1.0) - m * (m - 1.0)).sqrt(), lowered)))
        }
        (LocalOperator::Phase(phi), Ket::Basis { space, label }) => {
            let n = space.basis_index(label)?;
            let phase = (Scalar::i() * phi.clone() * Scalar::real(n as f64)).exp();
            Ok(Some(Ket::scalar_times(phase, ket.clone())))
        }
        (LocalOperator::Phase(phi), Ket::Coherent { space, amplitude }) => {
            let rotated = amplitude.clone() * (Scalar::i() * phi.clone()).exp();
            Ok(Some(Ket::coherent(space.clone(), rotated)))
        }
        (LocalOperator::Displace(beta), Ket::Basis { space, label }) => {
            if space.basis_index(label)? != 0 {
                return Ok(None);
            }
            Ok(Some(Ket::coherent(space.clone(), beta.clone())))
        }
        (LocalOperator::Displace(beta), Ket::Coherent { space, amplitude }) => {
            let alpha = amplitude;
            let exponent = (beta.clone() * alpha.conj() - beta.conj() * alpha.clone())
                * Scalar::real(0.5);
            Ok(Some(Ket::scalar_times(
                exponent.exp(),
                Ket::coherent(space.clone(), alpha.clone() + beta.clone()),
            )))
        }
        (LocalOperator::Sigma(j, k), Ket::Basis { space, label }) => {
            if k != label {
                return Ok(Some(Ket::Zero));
            }
            Ket::basis(space.clone(), j).map(Some)
        }
        _ => Ok(None),
    }
}

impl Operator {
    /// Apply the operator to `ket`; see [`Ket::apply`].
    pub fn act_on(&self, ket: &Ket) -> AlgebraResult<Ket> {
        Ket::apply(self, ket)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, kets: &[Ket], sep: &str) -> fmt::Result {
    for (i, k) in kets.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{k}")?;
    }
    Ok(())
}

impl fmt::Display for Ket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ket::Zero => write!(f, "0"),
            Ket::Trivial => write!(f, "1"),
            Ket::Symbol { label, .. } => write!(f, "|{label}>"),
            Ket::Basis { space, label } => write!(f, "|{label}>_{}", space.label()),
            Ket::Coherent { space, amplitude } => {
                write!(f, "|alpha={amplitude}>_{}", space.label())
            }
            Ket::ScalarTimes(c, ket) => write!(f, "{c} * {ket}"),
            Ket::OperatorTimes(op, ket) => write!(f, "{op} {ket}"),
            Ket::Tensor(factors) => write_joined(f, factors, " x "),
            Ket::Plus(terms) => write_joined(f, terms, " + "),
        }
    }
}

impl std::ops::Neg for Ket {
    type Output = Ket;

    fn neg(self) -> Self::Output {
        Ket::scalar_times(Scalar::real(-1.0), self)
    }
}

impl std::ops::Mul<Ket> for Scalar {
    type Output = Ket;

    fn mul(self, rhs: Ket) -> Self::Output {
        Ket::scalar_times(self, rhs)
    }
}

impl std::ops::Mul<Ket> for f64 {
    type Output = Ket;

    fn mul(self, rhs: Ket) -> Self::Output {
        Ket::scalar_times(Scalar::real(self), rhs)
    }
}
