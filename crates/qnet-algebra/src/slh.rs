//! SLH models of open quantum systems.
//!
//! An SLH triple `(S, L, H)` describes a component with `n` bosonic input
//! and output channels: the `n × n` scattering matrix `S`, the `n × 1`
//! coupling vector `L` and the internal Hamiltonian `H`. Circuit operations
//! on SLH models have closed forms (Gough and James), which the circuit
//! algebra uses whenever both operands are SLH triples.

use std::fmt;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{AlgebraError, AlgebraResult};
use crate::hilbert::{HilbertSpace, LocalSpace};
use crate::matrix::OperatorMatrix;
use crate::operator::Operator;
use crate::permutation::map_signals;
use crate::scalar::Scalar;

/// An SLH triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slh {
    s: OperatorMatrix,
    l: OperatorMatrix,
    h: Operator,
}

/// `(m† − m) i/2`, the anti-Hermitian part of `m` turned Hermitian.
fn im_adjoint(m: &Operator) -> Operator {
    Operator::scalar_times(
        Scalar::i() * Scalar::real(0.5),
        Operator::sum([m.adjoint(), -m.clone()]),
    )
}

impl Slh {
    /// Create a model, checking that `s` is square and `l` a matching column.
    pub fn new(s: OperatorMatrix, l: OperatorMatrix, h: Operator) -> AlgebraResult<Self> {
        let (n, m) = s.shape();
        if n != m || l.shape() != (n, 1) {
            return Err(AlgebraError::ShapeMismatch {
                lhs: s.shape(),
                rhs: l.shape(),
            });
        }
        Ok(Slh { s, l, h })
    }

    /// The trivial model of `n` straight-through channels.
    pub fn identity(n: usize) -> Self {
        Slh {
            s: OperatorMatrix::identity(n),
            l: OperatorMatrix::zeros(n, 1),
            h: Operator::Zero,
        }
    }

    /// The model of a channel permutation.
    pub fn permutation(perm: &[usize]) -> Self {
        Slh {
            s: OperatorMatrix::permutation(perm),
            l: OperatorMatrix::zeros(perm.len(), 1),
            h: Operator::Zero,
        }
    }

    /// Scattering matrix.
    pub fn s(&self) -> &OperatorMatrix {
        &self.s
    }

    /// Coupling vector.
    pub fn l(&self) -> &OperatorMatrix {
        &self.l
    }

    /// Hamiltonian.
    pub fn h(&self) -> &Operator {
        &self.h
    }

    /// Number of channels.
    pub fn cdim(&self) -> usize {
        self.s.shape().0
    }

    /// The space of all internal degrees of freedom.
    pub fn space(&self) -> HilbertSpace {
        self.s
            .space()
            .tensor(&self.l.space())
            .tensor(&self.h.space())
    }

    /// Series product `self ◁ other`: the outputs of `other` feed the inputs
    /// of `self`.
    pub fn series_with_slh(&self, other: &Slh) -> AlgebraResult<Slh> {
        if self.cdim() != other.cdim() {
            return Err(AlgebraError::CircuitDimensionMismatch {
                expected: self.cdim(),
                got: other.cdim(),
            });
        }
        let s = self.s.dot(&other.s)?;
        let l = self.s.dot(&other.l)?.plus(&self.l)?;
        let cross = self.l.adjoint().dot(&self.s)?.dot(&other.l)?;
        let h = Operator::sum([self.h.clone(), other.h.clone(), im_adjoint(&cross[(0, 0)])]);
        Ok(Slh { s, l, h })
    }

    /// Concatenation: the two models side by side.
    pub fn concatenate_slh(&self, other: &Slh) -> AlgebraResult<Slh> {
        Ok(Slh {
            s: self.s.block_diag(&other.s),
            l: self.l.vstack(&other.l)?,
            h: Operator::sum([self.h.clone(), other.h.clone()]),
        })
    }

    /// The inverse with respect to the series product.
    pub fn series_inverse(&self) -> AlgebraResult<Slh> {
        let s_dag = self.s.adjoint();
        let l = s_dag.dot(&self.l)?.scale(&Scalar::real(-1.0));
        Ok(Slh {
            s: s_dag,
            l,
            h: -self.h.clone(),
        })
    }

    /// Feed output `out_port` back into input `in_port`.
    ///
    /// Only models where `S[out, in]` is a scalar multiple of the identity
    /// can be reduced.
    pub fn feedback(&self, out_port: usize, in_port: usize) -> AlgebraResult<Slh> {
        let cdim = self.cdim();
        if cdim < 2 {
            return Err(AlgebraError::FeedbackDimension(cdim));
        }
        for index in [out_port, in_port] {
            if index >= cdim {
                return Err(AlgebraError::ChannelOutOfRange { index, cdim });
            }
        }
        let n = cdim - 1;
        if out_port != n {
            let route = Slh::permutation(&map_signals(&[(out_port, n)], cdim)?);
            return route.series_with_slh(self)?.feedback(n, in_port);
        }
        if in_port != n {
            let route = Slh::permutation(&map_signals(&[(n, in_port)], cdim)?);
            return self.series_with_slh(&route)?.feedback(n, n);
        }

        let s_nn = self.s[(n, n)].expand();
        let one_minus = Scalar::one()
            - s_nn
                .as_scalar()
                .ok_or_else(|| AlgebraError::NonScalarInverse(s_nn.to_string()))?;
        let inv = one_minus.inverse()?;
        debug!(cdim, "closing SLH feedback loop");

        let through = |a: &Operator, b: &Operator| {
            Operator::scalar_times(inv.clone(), Operator::product([a.clone(), b.clone()]))
        };
        let s = Array2::from_shape_fn((n, n), |(i, j)| {
            Operator::sum([self.s[(i, j)].clone(), through(&self.s[(i, n)], &self.s[(n, j)])])
        });
        let l = (0..n)
            .map(|i| Operator::sum([self.l[(i, 0)].clone(), through(&self.s[(i, n)], &self.l[(n, 0)])]))
            .collect();
        let loop_term = self
            .l
            .adjoint()
            .dot(&self.s.submatrix(0..cdim, n..cdim))?;
        let h = Operator::sum([
            self.h.clone(),
            im_adjoint(&through(&loop_term[(0, 0)], &self.l[(n, 0)])),
        ]);
        Ok(Slh {
            s: OperatorMatrix::from_array(s),
            l: OperatorMatrix::column(l),
            h,
        })
    }

    /// Drive the inputs with coherent amplitudes.
    pub fn coherent_input(&self, amplitudes: &[Scalar]) -> AlgebraResult<Slh> {
        if amplitudes.len() != self.cdim() {
            return Err(AlgebraError::CircuitDimensionMismatch {
                expected: self.cdim(),
                got: amplitudes.len(),
            });
        }
        let displacement = Slh {
            s: OperatorMatrix::identity(self.cdim()),
            l: OperatorMatrix::column(
                amplitudes
                    .iter()
                    .map(|a| Operator::scalar_times(a.clone(), Operator::Identity))
                    .collect(),
            ),
            h: Operator::Zero,
        };
        self.series_with_slh(&displacement)
    }

    /// Expand every entry.
    pub fn expand(&self) -> Slh {
        Slh {
            s: self.s.expand(),
            l: self.l.expand(),
            h: self.h.expand(),
        }
    }

    /// Replace operator sub-expressions according to `mapping`.
    pub fn substitute(&self, mapping: &[(Operator, Operator)]) -> Slh {
        Slh {
            s: self.s.map(|op| op.substitute(mapping)),
            l: self.l.map(|op| op.substitute(mapping)),
            h: self.h.substitute(mapping),
        }
    }

    /// The Heisenberg-picture equation of motion for `x`.
    ///
    /// Without `noises` only the Hamiltonian and Lindblad parts are included;
    /// with one noise operator per channel the quantum noise terms are added.
    pub fn symbolic_heisenberg_eom(
        &self,
        x: &Operator,
        noises: Option<&[Operator]>,
    ) -> AlgebraResult<Operator> {
        let mut summands = vec![Operator::scalar_times(
            Scalar::i(),
            Operator::commutator(&self.h, x),
        )];
        let l = self.l.column_entries(0);
        for lk in &l {
            let lk_dag = lk.adjoint();
            summands.push(Operator::product([lk_dag.clone(), x.clone(), lk.clone()]));
            let n = Operator::product([lk_dag, lk.clone()]);
            summands.push(Operator::scalar_times(
                Scalar::real(-0.5),
                Operator::product([n.clone(), x.clone()]) + Operator::product([x.clone(), n]),
            ));
        }

        if let Some(noises) = noises {
            let cdim = self.cdim();
            if noises.len() != cdim {
                return Err(AlgebraError::CircuitDimensionMismatch {
                    expected: cdim,
                    got: noises.len(),
                });
            }
            for j in 0..cdim {
                for k in 0..cdim {
                    // b_j† S_kj† [X, L_k] + [L_j†, X] S_jk b_k
                    summands.push(Operator::product([
                        noises[j].adjoint(),
                        self.s[(k, j)].adjoint(),
                        Operator::commutator(x, &l[k]),
                    ]));
                    summands.push(Operator::product([
                        Operator::commutator(&l[j].adjoint(), x),
                        self.s[(j, k)].clone(),
                        noises[k].clone(),
                    ]));
                }
            }
            if !self.s.space().is_disjoint(&x.space()) {
                for j in 0..cdim {
                    for k in 0..cdim {
                        let mut inner: Vec<Operator> = (0..cdim)
                            .map(|m| {
                                Operator::product([
                                    self.s[(m, j)].adjoint(),
                                    x.clone(),
                                    self.s[(m, k)].clone(),
                                ])
                            })
                            .collect();
                        if j == k {
                            inner.push(-x.clone());
                        }
                        summands.push(Operator::product([
                            noises[j].adjoint(),
                            Operator::sum(inner),
                            noises[k].clone(),
                        ]));
                    }
                }
            }
        }
        Ok(Operator::sum(summands).expand())
    }
}

impl fmt::Display for Slh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SLH({}, {}, {})", self.s, self.l, self.h)
    }
}

/// Linearised input-output dynamics of an SLH model.
///
/// With mode vector `a`, noise inputs `b` and outputs `y`:
/// `da/dt = A a + B b + a_offset`, `y = C a + D b + c_offset`. In the
/// doubled-up form the mode and noise vectors are extended by their adjoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearization {
    /// The modes, in the order of the rows of `a`.
    pub modes: Vec<LocalSpace>,
    /// Drift matrix.
    pub a: Array2<Scalar>,
    /// Input coupling.
    pub b: Array2<Scalar>,
    /// Output coupling.
    pub c: Array2<Scalar>,
    /// Direct feed-through.
    pub d: Array2<Scalar>,
    /// Constant drive of the modes.
    pub a_offset: Array1<Scalar>,
    /// Constant part of the outputs.
    pub c_offset: Array1<Scalar>,
}

struct LinearTerms {
    terms: Vec<(Operator, Scalar)>,
}

impl LinearTerms {
    fn new(expr: &Operator, allowed: &[Operator]) -> AlgebraResult<Self> {
        let terms = expr.coefficients();
        for (monomial, _) in &terms {
            if *monomial != Operator::Identity && !allowed.contains(monomial) {
                return Err(AlgebraError::NonLinear(monomial.to_string()));
            }
        }
        Ok(LinearTerms { terms })
    }

    fn of(&self, monomial: &Operator) -> Scalar {
        Scalar::sum(
            self.terms
                .iter()
                .filter(|(m, _)| m == monomial)
                .map(|(_, c)| c.clone()),
        )
    }

    fn constant(&self) -> Scalar {
        self.of(&Operator::Identity)
    }
}

/// The space of the noise input of channel `k`, labelled `ext_k` with primes
/// appended until the label is not used by the model.
fn noise_space(space: &HilbertSpace, k: usize) -> LocalSpace {
    let mut label = format!("ext_{k}");
    while space.local_factors().iter().any(|f| f.label() == label) {
        label.push('\'');
    }
    LocalSpace::new(label)
}

/// Linearise `slh` around zero.
///
/// Every mode is a local space of the model; its annihilation operator is
/// the dynamical variable. Fails with [`AlgebraError::NonLinear`] when an
/// equation of motion or output contains terms other than constants and
/// first-order mode and noise operators.
pub fn get_abcd(slh: &Slh, doubled_up: bool) -> AlgebraResult<Linearization> {
    let space = slh.space();
    if matches!(space, HilbertSpace::Full) {
        return Err(AlgebraError::NonLinear(space.to_string()));
    }
    let modes: Vec<LocalSpace> = space.local_factors().to_vec();
    let ncav = modes.len();
    let cdim = slh.cdim();
    let noises: Vec<Operator> = (0..cdim)
        .map(|k| Operator::symbol(format!("b_{k}"), noise_space(&space, k)))
        .collect();

    let annihilators: Vec<Operator> = modes.iter().map(|m| Operator::destroy(m.clone())).collect();
    let creators: Vec<Operator> = modes.iter().map(|m| Operator::create(m.clone())).collect();
    let noise_adjoints: Vec<Operator> = noises.iter().map(Operator::adjoint).collect();
    let allowed: Vec<Operator> = annihilators
        .iter()
        .chain(&creators)
        .chain(&noises)
        .chain(&noise_adjoints)
        .cloned()
        .collect();

    let factor = if doubled_up { 2 } else { 1 };
    let mut a = Array2::from_elem((factor * ncav, factor * ncav), Scalar::zero());
    let mut b = Array2::from_elem((factor * ncav, factor * cdim), Scalar::zero());
    let mut c = Array2::from_elem((factor * cdim, factor * ncav), Scalar::zero());
    let mut d = Array2::from_elem((factor * cdim, factor * cdim), Scalar::zero());
    let mut a_offset = Array1::from_elem(factor * ncav, Scalar::zero());
    let mut c_offset = Array1::from_elem(factor * cdim, Scalar::zero());

    for (k, ak) in annihilators.iter().enumerate() {
        let eom = slh.symbolic_heisenberg_eom(ak, Some(&noises))?;
        let terms = LinearTerms::new(&eom, &allowed)?;
        for j in 0..ncav {
            a[(k, j)] = terms.of(&annihilators[j]);
            if doubled_up {
                a[(k, j + ncav)] = terms.of(&creators[j]);
            }
        }
        for l in 0..cdim {
            b[(k, l)] = terms.of(&noises[l]);
            if doubled_up {
                b[(k, l + cdim)] = terms.of(&noise_adjoints[l]);
            }
        }
        a_offset[k] = terms.constant();
    }

    let l = slh.l.expand().column_entries(0);
    for (row, lk) in l.iter().enumerate() {
        let terms = LinearTerms::new(lk, &allowed)?;
        for j in 0..ncav {
            c[(row, j)] = terms.of(&annihilators[j]);
            if doubled_up {
                c[(row, j + ncav)] = terms.of(&creators[j]);
            }
        }
        c_offset[row] = terms.constant();
        for m in 0..cdim {
            let entry = slh.s[(row, m)].expand();
            d[(row, m)] = entry
                .as_scalar()
                .ok_or_else(|| AlgebraError::NonLinear(entry.to_string()))?;
        }
    }

    if doubled_up {
        for k in 0..ncav {
            for j in 0..ncav {
                a[(k + ncav, j + ncav)] = a[(k, j)].conj();
                a[(k + ncav, j)] = a[(k, j + ncav)].conj();
            }
            for l in 0..cdim {
                b[(k + ncav, l + cdim)] = b[(k, l)].conj();
                b[(k + ncav, l)] = b[(k, l + cdim)].conj();
            }
            a_offset[k + ncav] = a_offset[k].conj();
        }
        for row in 0..cdim {
            for j in 0..ncav {
                c[(row + cdim, j + ncav)] = c[(row, j)].conj();
                c[(row + cdim, j)] = c[(row, j + ncav)].conj();
            }
            for m in 0..cdim {
                d[(row + cdim, m + cdim)] = d[(row, m)].conj();
            }
            c_offset[row + cdim] = c_offset[row].conj();
        }
    }

    Ok(Linearization {
        modes,
        a,
        b,
        c,
        d,
        a_offset,
        c_offset,
    })
}
