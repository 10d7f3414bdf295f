//! QNET Symbolic Algebra
//!
//! This crate provides symbolic algebras for quantum-optical networks:
//! operators and states on tensor products of Hilbert spaces, and circuits
//! of open quantum systems that can be reduced to SLH models.
//!
//! # Overview
//!
//! Every expression is built through canonicalising constructors. Each
//! constructor applies an ordered set of algebraic rewrite rules
//! ([`rewrite::RuleSet`]) until no rule matches, so two expressions that are
//! structurally equal are algebraically equal under those rules. Successful
//! reductions are memoized per thread; see [`AlgebraConfig`] and
//! [`clear_caches`].
//!
//! # Core Components
//!
//! - **Scalars**: [`Scalar`] for numeric and symbolic coefficients
//! - **Hilbert spaces**: [`LocalSpace`] and [`HilbertSpace`]
//! - **Operators**: [`Operator`] built from [`LocalOperator`]s and symbols
//! - **States**: [`Ket`] with the action of local operators on basis and
//!   coherent states
//! - **Permutations**: free functions in [`permutation`] on image tuples
//! - **Circuits**: [`Circuit`] with series (`<<`), concatenation (`+`) and
//!   feedback
//! - **SLH models**: [`Slh`] with network composition, equations of motion
//!   and linearisation ([`get_abcd`])
//!
//! # Example: Cascading two Cavities
//!
//! ```rust
//! use qnet_algebra::{Circuit, Operator, OperatorMatrix, Slh};
//!
//! let cavity = |label: &str| {
//!     Slh::new(
//!         OperatorMatrix::identity(1),
//!         OperatorMatrix::column(vec![Operator::destroy(label)]),
//!         Operator::Zero,
//!     )
//!     .unwrap()
//! };
//!
//! let network = Circuit::slh(cavity("2"))
//!     .series(&Circuit::slh(cavity("1")))
//!     .unwrap();
//!
//! // both cavities are driven by the same field
//! let slh = network.to_slh().unwrap();
//! assert_eq!(slh.cdim(), 1);
//! ```
//!
//! # Channel Conventions
//!
//! | Term | Meaning |
//! |------|---------|
//! | `A << B` | output of `B` feeds input of `A` |
//! | `A + B` | `A` and `B` side by side, `A` on the top channels |
//! | `[A]_(k->l)` | output `k` of `A` fed back into input `l` |
//! | `P_sigma(...)` | input `j` routed to output `perm[j]` |

pub mod circuit;
pub mod config;
pub mod error;
pub mod hilbert;
pub mod matrix;
pub mod operator;
pub mod permutation;
pub mod rewrite;
pub mod scalar;
pub mod slh;
pub mod state;

pub use circuit::{
    Circuit, Connection, cid, circuit_identity, connect, connect_to_slh, factorize_for_rhs,
    map_signals_circuit, p_sigma,
};
pub use config::AlgebraConfig;
pub use error::{AlgebraError, AlgebraResult};
pub use hilbert::{HilbertSpace, LocalSpace};
pub use matrix::OperatorMatrix;
pub use operator::{LocalOperator, Operator};
pub use scalar::{Number, Scalar};
pub use slh::{Linearization, Slh, get_abcd};
pub use state::Ket;

/// Clear all memoization caches of the current thread.
pub fn clear_caches() {
    operator::clear_cache();
    circuit::clear_cache();
}
