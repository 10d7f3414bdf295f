//! Matrices of operators.

use std::fmt;
use std::ops::{Index, Range};

use ndarray::{Array2, Axis, concatenate, s};

use crate::error::{AlgebraError, AlgebraResult};
use crate::hilbert::HilbertSpace;
use crate::operator::Operator;
use crate::scalar::Scalar;

/// A dense matrix with operator entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorMatrix(Array2<Operator>);

impl OperatorMatrix {
    /// Wrap an existing array.
    pub fn from_array(data: Array2<Operator>) -> Self {
        OperatorMatrix(data)
    }

    /// Build a matrix from rows of equal length.
    pub fn from_rows(rows: Vec<Vec<Operator>>) -> AlgebraResult<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
            return Err(AlgebraError::ShapeMismatch {
                lhs: (nrows, ncols),
                rhs: (1, bad.len()),
            });
        }
        Ok(OperatorMatrix(Array2::from_shape_fn((nrows, ncols), |(i, j)| {
            rows[i][j].clone()
        })))
    }

    /// A column vector.
    pub fn column(entries: Vec<Operator>) -> Self {
        let n = entries.len();
        OperatorMatrix(Array2::from_shape_fn((n, 1), |(i, _)| entries[i].clone()))
    }

    /// The zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        OperatorMatrix(Array2::from_elem((rows, cols), Operator::Zero))
    }

    /// The identity matrix.
    pub fn identity(n: usize) -> Self {
        OperatorMatrix(Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                Operator::Identity
            } else {
                Operator::Zero
            }
        }))
    }

    /// The matrix routing input `j` to output `perm[j]`.
    pub fn permutation(perm: &[usize]) -> Self {
        let n = perm.len();
        OperatorMatrix(Array2::from_shape_fn((n, n), |(i, j)| {
            if perm[j] == i {
                Operator::Identity
            } else {
                Operator::Zero
            }
        }))
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        self.0.dim()
    }

    /// The underlying array.
    pub fn as_array(&self) -> &Array2<Operator> {
        &self.0
    }

    /// Entry `(i, j)`, if in range.
    pub fn get(&self, i: usize, j: usize) -> Option<&Operator> {
        self.0.get((i, j))
    }

    /// Matrix product.
    pub fn dot(&self, rhs: &OperatorMatrix) -> AlgebraResult<OperatorMatrix> {
        let (n, k) = self.shape();
        let (k2, m) = rhs.shape();
        if k != k2 {
            return Err(AlgebraError::ShapeMismatch {
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        Ok(OperatorMatrix(Array2::from_shape_fn((n, m), |(i, j)| {
            Operator::sum(
                (0..k).map(|l| Operator::product([self.0[(i, l)].clone(), rhs.0[(l, j)].clone()])),
            )
        })))
    }

    /// Entry-wise sum.
    pub fn plus(&self, rhs: &OperatorMatrix) -> AlgebraResult<OperatorMatrix> {
        if self.shape() != rhs.shape() {
            return Err(AlgebraError::ShapeMismatch {
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        Ok(OperatorMatrix(Array2::from_shape_fn(self.shape(), |ij| {
            Operator::sum([self.0[ij].clone(), rhs.0[ij].clone()])
        })))
    }

    /// Multiply every entry by `coeff`.
    pub fn scale(&self, coeff: &Scalar) -> OperatorMatrix {
        OperatorMatrix(self.0.map(|op| Operator::scalar_times(coeff.clone(), op.clone())))
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> OperatorMatrix {
        let (n, m) = self.shape();
        OperatorMatrix(Array2::from_shape_fn((m, n), |(i, j)| self.0[(j, i)].adjoint()))
    }

    /// Block-diagonal combination.
    pub fn block_diag(&self, other: &OperatorMatrix) -> OperatorMatrix {
        let (n1, m1) = self.shape();
        let (n2, m2) = other.shape();
        OperatorMatrix(Array2::from_shape_fn((n1 + n2, m1 + m2), |(i, j)| {
            match (i < n1, j < m1) {
                (true, true) => self.0[(i, j)].clone(),
                (false, false) => other.0[(i - n1, j - m1)].clone(),
                _ => Operator::Zero,
            }
        }))
    }

    /// Stack `other` below `self`.
    pub fn vstack(&self, other: &OperatorMatrix) -> AlgebraResult<OperatorMatrix> {
        concatenate(Axis(0), &[self.0.view(), other.0.view()])
            .map(OperatorMatrix)
            .map_err(|_| AlgebraError::ShapeMismatch {
                lhs: self.shape(),
                rhs: other.shape(),
            })
    }

    /// The sub-matrix over the given row and column ranges.
    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> OperatorMatrix {
        OperatorMatrix(self.0.slice(s![rows, cols]).to_owned())
    }

    /// Expand every entry.
    pub fn expand(&self) -> OperatorMatrix {
        OperatorMatrix(self.0.map(Operator::expand))
    }

    /// Apply `f` to every entry.
    pub fn map(&self, f: impl Fn(&Operator) -> Operator) -> OperatorMatrix {
        OperatorMatrix(self.0.map(f))
    }

    /// The tensor product of the spaces of all entries.
    pub fn space(&self) -> HilbertSpace {
        self.0
            .iter()
            .fold(HilbertSpace::Trivial, |acc, op| acc.tensor(&op.space()))
    }

    /// Entries of column `j`, top to bottom.
    pub fn column_entries(&self, j: usize) -> Vec<Operator> {
        self.0.column(j).iter().cloned().collect()
    }
}

impl Index<(usize, usize)> for OperatorMatrix {
    type Output = Operator;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Display for OperatorMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.0.rows().into_iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            for (j, op) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{op}")?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_matrix_dot() {
        let p = OperatorMatrix::permutation(&[1, 2, 0]);
        let v = OperatorMatrix::column(vec![
            Operator::destroy("1"),
            Operator::destroy("2"),
            Operator::destroy("3"),
        ]);
        let routed = p.dot(&v).unwrap();
        // input j ends up in row perm[j]
        assert_eq!(routed[(1, 0)], Operator::destroy("1"));
        assert_eq!(routed[(2, 0)], Operator::destroy("2"));
        assert_eq!(routed[(0, 0)], Operator::destroy("3"));
    }

    #[test]
    fn test_identity_is_neutral() {
        let m = OperatorMatrix::from_rows(vec![
            vec![Operator::destroy("1"), Operator::Zero],
            vec![Operator::Identity, Operator::create("1")],
        ])
        .unwrap();
        assert_eq!(OperatorMatrix::identity(2).dot(&m).unwrap(), m);
        assert_eq!(m.dot(&OperatorMatrix::identity(2)).unwrap(), m);
    }

    #[test]
    fn test_adjoint_transposes() {
        let m = OperatorMatrix::from_rows(vec![vec![Operator::destroy("1"), Operator::Identity]])
            .unwrap();
        let adj = m.adjoint();
        assert_eq!(adj.shape(), (2, 1));
        assert_eq!(adj[(0, 0)], Operator::create("1"));
    }

    #[test]
    fn test_block_diag_and_stack() {
        let a = OperatorMatrix::identity(1);
        let b = OperatorMatrix::permutation(&[1, 0]);
        let d = a.block_diag(&b);
        assert_eq!(d, OperatorMatrix::permutation(&[0, 2, 1]));
        let col = OperatorMatrix::zeros(1, 1)
            .vstack(&OperatorMatrix::column(vec![Operator::Identity]))
            .unwrap();
        assert_eq!(col.column_entries(0), vec![Operator::Zero, Operator::Identity]);
        assert!(a.vstack(&OperatorMatrix::zeros(1, 2)).is_err());
    }

    #[test]
    fn test_shape_errors() {
        assert!(OperatorMatrix::zeros(2, 3).dot(&OperatorMatrix::zeros(2, 3)).is_err());
        assert!(OperatorMatrix::from_rows(vec![vec![Operator::Zero], vec![]]).is_err());
        assert_eq!(OperatorMatrix::zeros(2, 2).submatrix(0..1, 1..2).shape(), (1, 1));
    }
}
