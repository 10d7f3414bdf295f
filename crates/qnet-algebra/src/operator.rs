//! Operator algebra.
//!
//! [`Operator`] values are built through canonicalising constructors
//! ([`Operator::sum`], [`Operator::product`], [`Operator::scalar_times`]),
//! so structurally equal values are algebraically equal under the rules
//! applied at construction time:
//!
//! | Operation | Rules |
//! |-----------|-------|
//! | sum | flatten, drop zero, collect like terms, sort |
//! | scalar product | `1·A = A`, `0·A = 0`, `c·(d·A) = (cd)·A`, distribute over sums |
//! | product | flatten, pull scalars out, drop identities, sort disjoint factors by space, local commutation relations |
//!
//! Products are not distributed over sums; use [`Operator::expand`] for that.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hilbert::{HilbertSpace, LocalSpace};
use crate::rewrite::{BinaryRule, Memo, RuleSet, memoize};
use crate::scalar::Scalar;

/// An elementary operator acting on a single degree of freedom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocalOperator {
    /// Bosonic creation operator `a†`.
    Create,
    /// Bosonic annihilation operator `a`.
    Destroy,
    /// Spin `z` component.
    Jz,
    /// Spin raising operator.
    Jplus,
    /// Spin lowering operator.
    Jminus,
    /// Phase operator `exp(iφ a†a)`.
    Phase(Scalar),
    /// Displacement operator `exp(α a† − α* a)`.
    Displace(Scalar),
    /// Squeezing operator `exp((η* a² − η a†²)/2)`.
    Squeeze(Scalar),
    /// Level transition `|j⟩⟨k|`.
    Sigma(String, String),
}

impl LocalOperator {
    /// Hermitian adjoint.
    pub fn adjoint(&self) -> LocalOperator {
        match self {
            LocalOperator::Create => LocalOperator::Destroy,
            LocalOperator::Destroy => LocalOperator::Create,
            LocalOperator::Jz => LocalOperator::Jz,
            LocalOperator::Jplus => LocalOperator::Jminus,
            LocalOperator::Jminus => LocalOperator::Jplus,
            LocalOperator::Phase(phi) => LocalOperator::Phase(-phi.conj()),
            LocalOperator::Displace(alpha) => LocalOperator::Displace(-alpha.clone()),
            LocalOperator::Squeeze(eta) => LocalOperator::Squeeze(-eta.clone()),
            LocalOperator::Sigma(j, k) => LocalOperator::Sigma(k.clone(), j.clone()),
        }
    }

    /// Whether the operator is the identity for its parameter value.
    fn is_identity(&self) -> bool {
        match self {
            LocalOperator::Phase(x) | LocalOperator::Displace(x) | LocalOperator::Squeeze(x) => {
                x.is_zero()
            }
            _ => false,
        }
    }
}

/// A symbolic operator expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    /// The zero operator.
    Zero,
    /// The identity operator.
    Identity,
    /// An unspecified operator on a given space.
    Symbol {
        /// Name of the operator.
        label: String,
        /// Space the operator acts on.
        space: HilbertSpace,
    },
    /// An elementary operator on one local space.
    Local {
        /// Space the operator acts on.
        space: LocalSpace,
        /// The operator.
        op: LocalOperator,
    },
    /// A scalar multiple of a non-sum operator.
    ScalarTimes(Scalar, Box<Operator>),
    /// A product of at least two factors that admit no further rewriting.
    Times(Vec<Operator>),
    /// A sum of at least two distinct terms, sorted.
    Plus(Vec<Operator>),
    /// The adjoint of an operator symbol.
    Adjoint(Box<Operator>),
}

thread_local! {
    static PRODUCT_CACHE: RefCell<Memo<Vec<Operator>, Operator>> = RefCell::new(Memo::new());
}

pub(crate) fn clear_cache() {
    PRODUCT_CACHE.with(|c| c.borrow_mut().clear());
}

static PRODUCT_RULES: RuleSet<Operator> = RuleSet::new(
    "operator_product",
    &[
        BinaryRule {
            name: "commute_disjoint",
            apply: commute_disjoint,
        },
        BinaryRule {
            name: "local_commutation",
            apply: local_commutation,
        },
    ],
    |op| match op {
        Operator::Times(ops) => ops,
        other => vec![other],
    },
    |op| matches!(op, Operator::Identity),
);

impl Operator {
    /// An operator symbol.
    pub fn symbol(label: impl Into<String>, space: impl Into<HilbertSpace>) -> Self {
        Operator::Symbol {
            label: label.into(),
            space: space.into(),
        }
    }

    /// An elementary operator; parameterised operators at zero are the
    /// identity.
    pub fn local(op: LocalOperator, space: impl Into<LocalSpace>) -> Self {
        if op.is_identity() {
            return Operator::Identity;
        }
        Operator::Local {
            space: space.into(),
            op,
        }
    }

    /// Creation operator.
    pub fn create(space: impl Into<LocalSpace>) -> Self {
        Self::local(LocalOperator::Create, space)
    }

    /// Annihilation operator.
    pub fn destroy(space: impl Into<LocalSpace>) -> Self {
        Self::local(LocalOperator::Destroy, space)
    }

    /// Spin `z` component.
    pub fn jz(space: impl Into<LocalSpace>) -> Self {
        Self::local(LocalOperator::Jz, space)
    }

    /// Spin raising operator.
    pub fn jplus(space: impl Into<LocalSpace>) -> Self {
        Self::local(LocalOperator::Jplus, space)
    }

    /// Spin lowering operator.
    pub fn jminus(space: impl Into<LocalSpace>) -> Self {
        Self::local(LocalOperator::Jminus, space)
    }

    /// Phase operator.
    pub fn phase(space: impl Into<LocalSpace>, phi: impl Into<Scalar>) -> Self {
        Self::local(LocalOperator::Phase(phi.into()), space)
    }

    /// Displacement operator.
    pub fn displace(space: impl Into<LocalSpace>, alpha: impl Into<Scalar>) -> Self {
        Self::local(LocalOperator::Displace(alpha.into()), space)
    }

    /// Squeezing operator.
    pub fn squeeze(space: impl Into<LocalSpace>, eta: impl Into<Scalar>) -> Self {
        Self::local(LocalOperator::Squeeze(eta.into()), space)
    }

    /// Level transition `|j⟩⟨k|`.
    pub fn sigma(space: impl Into<LocalSpace>, j: impl ToString, k: impl ToString) -> Self {
        Self::local(LocalOperator::Sigma(j.to_string(), k.to_string()), space)
    }

    /// Projector `|j⟩⟨j|`.
    pub fn projector(space: impl Into<LocalSpace>, j: impl ToString) -> Self {
        let j = j.to_string();
        Self::local(LocalOperator::Sigma(j.clone(), j), space)
    }

    /// The space the operator acts on.
    pub fn space(&self) -> HilbertSpace {
        match self {
            Operator::Zero | Operator::Identity => HilbertSpace::Trivial,
            Operator::Symbol { space, .. } => space.clone(),
            Operator::Local { space, .. } => space.clone().into(),
            Operator::ScalarTimes(_, op) | Operator::Adjoint(op) => op.space(),
            Operator::Times(ops) | Operator::Plus(ops) => ops
                .iter()
                .fold(HilbertSpace::Trivial, |acc, op| acc.tensor(&op.space())),
        }
    }

    /// The scalar value of a multiple of the identity.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Operator::Zero => Some(Scalar::zero()),
            Operator::Identity => Some(Scalar::one()),
            Operator::ScalarTimes(c, op) if **op == Operator::Identity => Some(c.clone()),
            _ => None,
        }
    }

    /// Split off the scalar prefactor: `self == coeff * term`.
    pub fn split_coefficient(&self) -> (Scalar, Operator) {
        match self {
            Operator::ScalarTimes(c, op) => (c.clone(), op.as_ref().clone()),
            other => (Scalar::one(), other.clone()),
        }
    }

    /// Terms of a sum; a non-sum is its own single term.
    pub fn into_summands(self) -> Vec<Operator> {
        match self {
            Operator::Zero => Vec::new(),
            Operator::Plus(ops) => ops,
            other => vec![other],
        }
    }

    /// Canonical scalar multiple.
    pub fn scalar_times(coeff: Scalar, op: Operator) -> Operator {
        if coeff.is_zero() {
            return Operator::Zero;
        }
        match op {
            Operator::Zero => Operator::Zero,
            op if coeff.is_one() => op,
            Operator::ScalarTimes(c, inner) => Self::scalar_times(coeff * c, *inner),
            Operator::Plus(ops) => {
                Self::sum(ops.into_iter().map(|o| Self::scalar_times(coeff.clone(), o)))
            }
            op => Operator::ScalarTimes(coeff, Box::new(op)),
        }
    }

    /// Canonical sum.
    pub fn sum(operands: impl IntoIterator<Item = Operator>) -> Operator {
        let mut collected: Vec<(Operator, Scalar)> = Vec::new();
        let mut pending: Vec<Operator> = operands.into_iter().collect();
        pending.reverse();
        while let Some(op) = pending.pop() {
            let (coeff, term) = match op {
                Operator::Zero => continue,
                Operator::Plus(ops) => {
                    pending.extend(ops.into_iter().rev());
                    continue;
                }
                Operator::ScalarTimes(c, term) => (c, *term),
                term => (Scalar::one(), term),
            };
            match collected.iter_mut().find(|(t, _)| *t == term) {
                Some((_, c)) => *c = c.clone() + coeff,
                None => collected.push((term, coeff)),
            }
        }

        let mut terms: Vec<Operator> = collected
            .into_iter()
            .map(|(t, c)| Self::scalar_times(c, t))
            .filter(|t| *t != Operator::Zero)
            .collect();
        terms.sort();
        match terms.len() {
            0 => Operator::Zero,
            1 => terms.remove(0),
            _ => Operator::Plus(terms),
        }
    }

    /// Canonical product.
    pub fn product(factors: impl IntoIterator<Item = Operator>) -> Operator {
        let mut coeff = Scalar::one();
        let mut flat = Vec::new();
        for factor in factors {
            if !collect_factor(factor, &mut coeff, &mut flat) {
                return Operator::Zero;
            }
        }
        if coeff.is_zero() {
            return Operator::Zero;
        }
        let core = match flat.len() {
            0 => Operator::Identity,
            1 => flat.remove(0),
            _ => {
                let Ok(op) = memoize(&PRODUCT_CACHE, flat, |ops| {
                    Ok::<_, Infallible>(reduce_product(ops))
                });
                op
            }
        };
        Self::scalar_times(coeff, core)
    }

    /// Hermitian adjoint.
    pub fn adjoint(&self) -> Operator {
        match self {
            Operator::Zero | Operator::Identity => self.clone(),
            Operator::Symbol { .. } => Operator::Adjoint(Box::new(self.clone())),
            Operator::Local { space, op } => Operator::Local {
                space: space.clone(),
                op: op.adjoint(),
            },
            Operator::ScalarTimes(c, op) => Self::scalar_times(c.conj(), op.adjoint()),
            Operator::Times(ops) => Self::product(ops.iter().rev().map(Operator::adjoint)),
            Operator::Plus(ops) => Self::sum(ops.iter().map(Operator::adjoint)),
            Operator::Adjoint(op) => op.as_ref().clone(),
        }
    }

    /// Alias for [`Operator::adjoint`].
    pub fn dag(&self) -> Operator {
        self.adjoint()
    }

    fn contains_sum(&self) -> bool {
        match self {
            Operator::Plus(_) => true,
            Operator::ScalarTimes(_, op) => op.contains_sum(),
            Operator::Times(ops) => ops.iter().any(Operator::contains_sum),
            _ => false,
        }
    }

    /// Distribute products over sums, recursively.
    pub fn expand(&self) -> Operator {
        match self {
            Operator::Plus(ops) => Self::sum(ops.iter().map(Operator::expand)),
            Operator::ScalarTimes(c, op) => Self::scalar_times(c.clone(), op.expand()),
            Operator::Adjoint(op) => op.expand().adjoint(),
            Operator::Times(ops) => {
                let mut terms = vec![Operator::Identity];
                for factor in ops {
                    let summands = factor.expand().into_summands();
                    let mut next = Vec::with_capacity(terms.len() * summands.len());
                    for t in &terms {
                        for s in &summands {
                            let p = Self::product([t.clone(), s.clone()]);
                            if p.contains_sum() {
                                next.extend(p.expand().into_summands());
                            } else {
                                next.push(p);
                            }
                        }
                    }
                    terms = next;
                }
                Self::sum(terms)
            }
            _ => self.clone(),
        }
    }

    /// `[A, B] = AB − BA`.
    pub fn commutator(a: &Operator, b: &Operator) -> Operator {
        Self::sum([
            Self::product([a.clone(), b.clone()]),
            Self::scalar_times(Scalar::real(-1.0), Self::product([b.clone(), a.clone()])),
        ])
    }

    /// Replace sub-expressions according to `mapping`.
    pub fn substitute(&self, mapping: &[(Operator, Operator)]) -> Operator {
        if let Some((_, replacement)) = mapping.iter().find(|(k, _)| k == self) {
            return replacement.clone();
        }
        match self {
            Operator::ScalarTimes(c, op) => Self::scalar_times(c.clone(), op.substitute(mapping)),
            Operator::Times(ops) => Self::product(ops.iter().map(|o| o.substitute(mapping))),
            Operator::Plus(ops) => Self::sum(ops.iter().map(|o| o.substitute(mapping))),
            Operator::Adjoint(op) => op.substitute(mapping).adjoint(),
            _ => self.clone(),
        }
    }

    /// The expanded operator as a list of `(monomial, coefficient)` pairs.
    pub fn coefficients(&self) -> Vec<(Operator, Scalar)> {
        self.expand()
            .into_summands()
            .into_iter()
            .map(|t| {
                let (c, m) = t.split_coefficient();
                (m, c)
            })
            .collect()
    }
}

/// Pull scalars out of `op` and append its non-trivial factors to `out`.
/// Returns `false` if the product is zero.
fn collect_factor(op: Operator, coeff: &mut Scalar, out: &mut Vec<Operator>) -> bool {
    match op {
        Operator::Zero => false,
        Operator::Identity => true,
        Operator::ScalarTimes(c, inner) => {
            *coeff = std::mem::replace(coeff, Scalar::one()) * c;
            collect_factor(*inner, coeff, out)
        }
        Operator::Times(ops) => ops.into_iter().all(|o| collect_factor(o, coeff, out)),
        other => {
            out.push(other);
            true
        }
    }
}

fn reduce_product(ops: Vec<Operator>) -> Operator {
    let Ok(mut ops) = PRODUCT_RULES.apply(ops);
    let needs_collect = ops.iter().any(|o| {
        matches!(
            o,
            Operator::Zero | Operator::Identity | Operator::ScalarTimes(..) | Operator::Times(_)
        )
    });
    if needs_collect {
        return Operator::product(ops);
    }
    match ops.len() {
        0 => Operator::Identity,
        1 => ops.remove(0),
        _ => Operator::Times(ops),
    }
}

/// Operators on disjoint spaces commute; order them by space.
fn commute_disjoint(a: &Operator, b: &Operator) -> Result<Option<Operator>, Infallible> {
    let (sa, sb) = (a.space(), b.space());
    if sb < sa && sa.is_disjoint(&sb) {
        return Ok(Some(Operator::Times(vec![b.clone(), a.clone()])));
    }
    Ok(None)
}

fn local_commutation(
    a: &Operator,
    b: &Operator,
) -> Result<Option<Operator>, Infallible> {
    use LocalOperator::{Create, Destroy, Displace, Jminus, Jplus, Jz, Phase, Sigma};

    let (
        Operator::Local { space, op: x },
        Operator::Local {
            space: space_b,
            op: y,
        },
    ) = (a, b)
    else {
        return Ok(None);
    };
    if space != space_b {
        return Ok(None);
    }
    let local = |op: LocalOperator| Operator::Local {
        space: space.clone(),
        op,
    };

    let result = match (x, y) {
        (Destroy, Create) => Operator::sum([
            Operator::Identity,
            Operator::Times(vec![local(Create), local(Destroy)]),
        ]),
        (Jz, Jplus) => Operator::sum([
            Operator::Times(vec![local(Jplus), local(Jz)]),
            local(Jplus),
        ]),
        (Jminus, Jz) => Operator::sum([
            Operator::Times(vec![local(Jz), local(Jminus)]),
            local(Jminus),
        ]),
        (Jminus, Jplus) => Operator::sum([
            Operator::Times(vec![local(Jplus), local(Jminus)]),
            Operator::scalar_times(Scalar::real(-2.0), local(Jz)),
        ]),
        (Sigma(j, k), Sigma(l, m)) => {
            if k == l {
                Operator::sigma(space.clone(), j, m)
            } else {
                Operator::Zero
            }
        }
        (Phase(p1), Phase(p2)) => Operator::phase(space.clone(), p1.clone() + p2.clone()),
        (Displace(a1), Displace(a2)) => {
            let exponent = (a1.clone() * a2.conj() - a1.conj() * a2.clone()) * Scalar::real(0.5);
            Operator::scalar_times(
                exponent.exp(),
                Operator::displace(space.clone(), a1.clone() + a2.clone()),
            )
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

impl fmt::Display for LocalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalOperator::Create => write!(f, "Create"),
            LocalOperator::Destroy => write!(f, "Destroy"),
            LocalOperator::Jz => write!(f, "Jz"),
            LocalOperator::Jplus => write!(f, "Jplus"),
            LocalOperator::Jminus => write!(f, "Jminus"),
            LocalOperator::Phase(x) => write!(f, "Phase[{x}]"),
            LocalOperator::Displace(x) => write!(f, "Displace[{x}]"),
            LocalOperator::Squeeze(x) => write!(f, "Squeeze[{x}]"),
            LocalOperator::Sigma(j, k) => write!(f, "sigma_{j},{k}"),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Zero => write!(f, "0"),
            Operator::Identity => write!(f, "1"),
            Operator::Symbol { label, .. } => write!(f, "{label}"),
            Operator::Local { space, op } => write!(f, "{op}({})", space.label()),
            Operator::ScalarTimes(c, op) => write!(f, "{c} * {op}"),
            Operator::Times(ops) => {
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    if matches!(op, Operator::Plus(_)) {
                        write!(f, "({op})")?;
                    } else {
                        write!(f, "{op}")?;
                    }
                }
                Ok(())
            }
            Operator::Plus(ops) => {
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{op}")?;
                }
                Ok(())
            }
            Operator::Adjoint(op) => write!(f, "{op}^dag"),
        }
    }
}

impl std::ops::Add for Operator {
    type Output = Operator;

    fn add(self, rhs: Self) -> Self::Output {
        Operator::sum([self, rhs])
    }
}

impl std::ops::Sub for Operator {
    type Output = Operator;

    fn sub(self, rhs: Self) -> Self::Output {
        Operator::sum([self, -rhs])
    }
}

impl std::ops::Neg for Operator {
    type Output = Operator;

    fn neg(self) -> Self::Output {
        Operator::scalar_times(Scalar::real(-1.0), self)
    }
}

impl std::ops::Mul for Operator {
    type Output = Operator;

    fn mul(self, rhs: Self) -> Self::Output {
        Operator::product([self, rhs])
    }
}

impl std::ops::Mul<Scalar> for Operator {
    type Output = Operator;

    fn mul(self, rhs: Scalar) -> Self::Output {
        Operator::scalar_times(rhs, self)
    }
}

impl std::ops::Mul<Operator> for Scalar {
    type Output = Operator;

    fn mul(self, rhs: Operator) -> Self::Output {
        Operator::scalar_times(self, rhs)
    }
}

impl std::ops::Mul<Operator> for f64 {
    type Output = Operator;

    fn mul(self, rhs: Operator) -> Self::Output {
        Operator::scalar_times(Scalar::real(self), rhs)
    }
}
