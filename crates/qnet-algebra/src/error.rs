//! Error types for the algebra crate.

use thiserror::Error;

/// Errors raised when an algebraic invariant is violated at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AlgebraError {
    /// Two expressions were combined that must live in the same Hilbert space.
    #[error("Hilbert spaces differ: {lhs} vs {rhs}")]
    UnequalSpaces {
        /// Space of the left operand.
        lhs: String,
        /// Space of the right operand.
        rhs: String,
    },

    /// Two expressions were combined that must live in disjoint Hilbert spaces.
    #[error("Hilbert spaces overlap: {lhs} and {rhs}")]
    OverlappingSpaces {
        /// Space of the left operand.
        lhs: String,
        /// Space of the right operand.
        rhs: String,
    },

    /// The dimension of a Hilbert space was required but never set.
    #[error("Dimension of Hilbert space '{0}' is not defined")]
    UndefinedDimension(String),

    /// A basis label does not belong to the space it was used with.
    #[error("Basis label '{label}' is not valid in Hilbert space '{space}'")]
    BasisLabel {
        /// The offending label.
        label: String,
        /// Label of the local space.
        space: String,
    },

    /// An image tuple is not a permutation of `0..n`.
    #[error("Invalid permutation {0:?}")]
    BadPermutation(Vec<usize>),

    /// A sequence and a permutation of different length were combined.
    #[error("Sequence of length {sequence} cannot be permuted by a permutation of length {permutation}")]
    PermutationLength {
        /// Length of the sequence.
        sequence: usize,
        /// Length of the permutation.
        permutation: usize,
    },

    /// Circuits with different channel counts were put in series.
    #[error("Circuit channel dimensions differ: expected {expected}, got {got}")]
    CircuitDimensionMismatch {
        /// Channel count of the first operand.
        expected: usize,
        /// Channel count of the offending operand.
        got: usize,
    },

    /// A circuit cannot be split along the requested block structure.
    #[error("Block structure {requested:?} is incompatible with {actual:?}")]
    IncompatibleBlockStructure {
        /// Block structure that was asked for.
        requested: Vec<usize>,
        /// Block structure of the circuit.
        actual: Vec<usize>,
    },

    /// A channel or port index is out of range.
    #[error("Channel {index} out of range for {cdim} channels")]
    ChannelOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of available channels.
        cdim: usize,
    },

    /// A connection refers to a component that does not exist.
    #[error("Component {index} out of range for {count} components")]
    ComponentOutOfRange {
        /// The offending component index.
        index: usize,
        /// Number of components.
        count: usize,
    },

    /// Feedback was requested on a circuit with fewer than two channels.
    #[error("Feedback requires at least two channels, circuit has {0}")]
    FeedbackDimension(usize),

    /// A circuit contains elements without an SLH representation.
    #[error("Cannot convert {0} to an SLH model")]
    CannotConvertToSlh(String),

    /// An operator had to be inverted but is not a multiple of the identity.
    #[error("Cannot invert non-scalar operator {0}")]
    NonScalarInverse(String),

    /// A scalar had to be inverted but is zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// An equation of motion contains terms that are not linear in the modes.
    #[error("Expression is not linear in the mode operators: {0}")]
    NonLinear(String),

    /// Two matrices of incompatible shape were combined.
    #[error("Matrix shapes {lhs:?} and {rhs:?} are incompatible")]
    ShapeMismatch {
        /// Shape of the left matrix.
        lhs: (usize, usize),
        /// Shape of the right matrix.
        rhs: (usize, usize),
    },
}

/// Result type for algebra operations.
pub type AlgebraResult<T> = Result<T, AlgebraError>;
