//! Hilbert spaces.
//!
//! Every operator and state lives in a [`HilbertSpace`], which is either
//! trivial, a single [`LocalSpace`] (one degree of freedom), a tensor product
//! of local spaces, or the full space of everything.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, AlgebraResult};

/// The Hilbert space of a single degree of freedom.
///
/// The basis is either given by explicit labels or, if only a dimension is
/// known, by the labels `"0"`, `"1"`, ... A space without either has an
/// undefined (possibly infinite) dimension; basis states are then labelled by
/// non-negative integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalSpace {
    label: String,
    basis: Option<Vec<String>>,
    dimension: Option<usize>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum LabelKey<'a> {
    Number(i64),
    Text(&'a str),
}

impl LocalSpace {
    /// Create a local space with undefined dimension.
    pub fn new(label: impl ToString) -> Self {
        Self {
            label: label.to_string(),
            basis: None,
            dimension: None,
        }
    }

    /// A spin space of spin `twice_j / 2`, with basis labels `-j, ..., j`
    /// (`"-1/2"`, `"1/2"` for half-integer spins).
    pub fn spin(label: impl ToString, twice_j: u32) -> Self {
        let twice_j = i64::from(twice_j);
        let labels = (-twice_j..=twice_j).step_by(2).map(|m2| {
            if twice_j % 2 == 0 {
                (m2 / 2).to_string()
            } else {
                format!("{m2}/2")
            }
        });
        Self::new(label).with_basis(labels)
    }

    /// Set the dimension, dropping any explicit basis.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self.basis = None;
        self
    }

    /// Set explicit basis labels; the dimension follows from their number.
    #[must_use]
    pub fn with_basis(mut self, labels: impl IntoIterator<Item = impl ToString>) -> Self {
        let basis: Vec<String> = labels.into_iter().map(|l| l.to_string()).collect();
        self.dimension = Some(basis.len());
        self.basis = Some(basis);
        self
    }

    /// The space label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The explicit basis labels, if any.
    pub fn basis(&self) -> Option<&[String]> {
        self.basis.as_deref()
    }

    /// The dimension, if defined.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn label_error(&self, label: &str) -> AlgebraError {
        AlgebraError::BasisLabel {
            label: label.to_string(),
            space: self.label.clone(),
        }
    }

    /// Position of a basis label.
    pub fn basis_index(&self, label: &str) -> AlgebraResult<usize> {
        if let Some(basis) = &self.basis {
            return basis
                .iter()
                .position(|b| b == label)
                .ok_or_else(|| self.label_error(label));
        }
        let index: usize = label.parse().map_err(|_| self.label_error(label))?;
        match self.dimension {
            Some(d) if index >= d => Err(self.label_error(label)),
            _ => Ok(index),
        }
    }

    /// Label of the basis state at `index`.
    pub fn basis_label(&self, index: usize) -> AlgebraResult<String> {
        if let Some(basis) = &self.basis {
            return basis
                .get(index)
                .cloned()
                .ok_or_else(|| self.label_error(&index.to_string()));
        }
        match self.dimension {
            Some(d) if index >= d => Err(self.label_error(&index.to_string())),
            _ => Ok(index.to_string()),
        }
    }

    /// Spin quantum number `j = (dimension - 1) / 2`.
    pub fn spin_j(&self) -> AlgebraResult<f64> {
        let d = self
            .dimension
            .ok_or_else(|| AlgebraError::UndefinedDimension(self.label.clone()))?;
        Ok((d as f64 - 1.0) / 2.0)
    }

    /// Magnetic quantum number of a basis state of a spin space.
    ///
    /// Labels of the form `"m"` or `"p/q"` are read directly; other labels
    /// are counted from `-j` by their basis position.
    pub fn magnetic_number(&self, label: &str) -> AlgebraResult<f64> {
        let index = self.basis_index(label)?;
        if self.basis.is_some() {
            if let Some(m) = parse_rational(label) {
                return Ok(m);
            }
        }
        Ok(index as f64 - self.spin_j()?)
    }

    fn sort_key(&self) -> (LabelKey<'_>, &str, &Option<Vec<String>>, Option<usize>) {
        let key = match self.label.parse::<i64>() {
            Ok(n) => LabelKey::Number(n),
            Err(_) => LabelKey::Text(&self.label),
        };
        (key, &self.label, &self.basis, self.dimension)
    }
}

fn parse_rational(label: &str) -> Option<f64> {
    match label.split_once('/') {
        Some((num, den)) => {
            let num: i64 = num.trim().parse().ok()?;
            let den: i64 = den.trim().parse().ok()?;
            (den != 0).then(|| num as f64 / den as f64)
        }
        None => label.trim().parse::<i64>().ok().map(|m| m as f64),
    }
}

impl PartialOrd for LocalSpace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSpace {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for LocalSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H_{}", self.label)
    }
}

impl From<&str> for LocalSpace {
    fn from(label: &str) -> Self {
        LocalSpace::new(label)
    }
}

impl From<String> for LocalSpace {
    fn from(label: String) -> Self {
        LocalSpace::new(label)
    }
}

impl From<i32> for LocalSpace {
    fn from(label: i32) -> Self {
        LocalSpace::new(label)
    }
}

impl From<usize> for LocalSpace {
    fn from(label: usize) -> Self {
        LocalSpace::new(label)
    }
}

/// A Hilbert space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HilbertSpace {
    /// The one-dimensional space of scalars.
    Trivial,
    /// A single degree of freedom.
    Local(LocalSpace),
    /// A tensor product of at least two distinct local spaces, sorted.
    Product(Vec<LocalSpace>),
    /// The space of all degrees of freedom.
    Full,
}

impl HilbertSpace {
    /// Build a space from local factors; duplicates merge.
    pub fn from_factors(factors: impl IntoIterator<Item = LocalSpace>) -> Self {
        let mut factors: Vec<LocalSpace> = factors.into_iter().collect();
        factors.sort();
        factors.dedup();
        match factors.len() {
            0 => HilbertSpace::Trivial,
            1 => HilbertSpace::Local(factors.remove(0)),
            _ => HilbertSpace::Product(factors),
        }
    }

    /// The local factors. The full space has none that can be listed.
    pub fn local_factors(&self) -> &[LocalSpace] {
        match self {
            HilbertSpace::Trivial | HilbertSpace::Full => &[],
            HilbertSpace::Local(l) => std::slice::from_ref(l),
            HilbertSpace::Product(v) => v,
        }
    }

    /// Whether this is the trivial space.
    pub fn is_trivial(&self) -> bool {
        matches!(self, HilbertSpace::Trivial)
    }

    /// Tensor product. Factors shared by both spaces appear once.
    pub fn tensor(&self, other: &HilbertSpace) -> HilbertSpace {
        if matches!(self, HilbertSpace::Full) || matches!(other, HilbertSpace::Full) {
            return HilbertSpace::Full;
        }
        HilbertSpace::from_factors(
            self.local_factors()
                .iter()
                .chain(other.local_factors())
                .cloned(),
        )
    }

    /// The factors of `self` that are not in `other`.
    pub fn remove(&self, other: &HilbertSpace) -> HilbertSpace {
        match (self, other) {
            (_, HilbertSpace::Full) => HilbertSpace::Trivial,
            (HilbertSpace::Full, _) => HilbertSpace::Full,
            _ => HilbertSpace::from_factors(
                self.local_factors()
                    .iter()
                    .filter(|f| !other.local_factors().contains(f))
                    .cloned(),
            ),
        }
    }

    /// The factors common to both spaces.
    pub fn intersect(&self, other: &HilbertSpace) -> HilbertSpace {
        match (self, other) {
            (HilbertSpace::Full, s) | (s, HilbertSpace::Full) => s.clone(),
            _ => HilbertSpace::from_factors(
                self.local_factors()
                    .iter()
                    .filter(|f| other.local_factors().contains(f))
                    .cloned(),
            ),
        }
    }

    /// Whether the spaces share no degree of freedom.
    pub fn is_disjoint(&self, other: &HilbertSpace) -> bool {
        if self.is_trivial() || other.is_trivial() {
            return true;
        }
        self.intersect(other).is_trivial()
    }

    /// Whether every factor of `self` is a factor of `other`.
    pub fn is_subspace_of(&self, other: &HilbertSpace) -> bool {
        match (self, other) {
            (_, HilbertSpace::Full) | (HilbertSpace::Trivial, _) => true,
            (HilbertSpace::Full, _) => false,
            _ => self
                .local_factors()
                .iter()
                .all(|f| other.local_factors().contains(f)),
        }
    }

    /// Total dimension.
    pub fn dimension(&self) -> AlgebraResult<usize> {
        match self {
            HilbertSpace::Full => Err(AlgebraError::UndefinedDimension(self.to_string())),
            _ => self.local_factors().iter().try_fold(1usize, |acc, f| {
                f.dimension()
                    .map(|d| acc * d)
                    .ok_or_else(|| AlgebraError::UndefinedDimension(f.label().to_string()))
            }),
        }
    }
}

impl From<LocalSpace> for HilbertSpace {
    fn from(space: LocalSpace) -> Self {
        HilbertSpace::Local(space)
    }
}

impl PartialOrd for HilbertSpace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HilbertSpace {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (HilbertSpace::Full, HilbertSpace::Full) => Ordering::Equal,
            (HilbertSpace::Full, _) => Ordering::Greater,
            (_, HilbertSpace::Full) => Ordering::Less,
            _ => self.local_factors().cmp(other.local_factors()),
        }
    }
}

impl fmt::Display for HilbertSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HilbertSpace::Trivial => write!(f, "TrivialSpace"),
            HilbertSpace::Full => write!(f, "FullSpace"),
            HilbertSpace::Local(l) => write!(f, "{l}"),
            HilbertSpace::Product(factors) => {
                for (i, l) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{l}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(label: &str) -> HilbertSpace {
        LocalSpace::new(label).into()
    }

    #[test]
    fn test_natural_label_order() {
        let mut spaces = vec![LocalSpace::new(10), LocalSpace::new("q"), LocalSpace::new(2)];
        spaces.sort();
        let labels: Vec<_> = spaces.iter().map(LocalSpace::label).collect();
        assert_eq!(labels, vec!["2", "10", "q"]);
    }

    #[test]
    fn test_tensor_is_commutative_and_idempotent() {
        let ab = h("a").tensor(&h("b"));
        assert_eq!(ab, h("b").tensor(&h("a")));
        assert_eq!(ab.tensor(&h("a")), ab);
        assert_eq!(ab.local_factors().len(), 2);
        assert_eq!(h("a").tensor(&HilbertSpace::Trivial), h("a"));
        assert_eq!(h("a").tensor(&HilbertSpace::Full), HilbertSpace::Full);
    }

    #[test]
    fn test_remove_and_intersect() {
        let abc = h("a").tensor(&h("b")).tensor(&h("c"));
        assert_eq!(abc.remove(&h("b")), h("a").tensor(&h("c")));
        assert_eq!(abc.intersect(&h("b").tensor(&h("d"))), h("b"));
        assert!(h("a").is_disjoint(&h("b")));
        assert!(!abc.is_disjoint(&h("c")));
        assert!(h("c").is_subspace_of(&abc));
        assert!(!abc.is_subspace_of(&h("c")));
    }

    #[test]
    fn test_dimension() {
        let a: HilbertSpace = LocalSpace::new("a").with_dimension(3).into();
        let b: HilbertSpace = LocalSpace::new("b").with_basis(["g", "e"]).into();
        assert_eq!(a.tensor(&b).dimension().unwrap(), 6);
        assert!(matches!(
            h("c").dimension(),
            Err(AlgebraError::UndefinedDimension(_))
        ));
        assert_eq!(HilbertSpace::Trivial.dimension().unwrap(), 1);
    }

    #[test]
    fn test_basis_index() {
        let tls = LocalSpace::new("tls").with_basis(["g", "e"]);
        assert_eq!(tls.basis_index("e").unwrap(), 1);
        assert!(tls.basis_index("x").is_err());
        let fock = LocalSpace::new("f").with_dimension(5);
        assert_eq!(fock.basis_index("4").unwrap(), 4);
        assert!(fock.basis_index("5").is_err());
        assert_eq!(LocalSpace::new("inf").basis_index("100").unwrap(), 100);
    }

    #[test]
    fn test_spin_labels() {
        let half = LocalSpace::spin("s", 1);
        assert_eq!(half.basis().unwrap(), ["-1/2", "1/2"]);
        assert_eq!(half.magnetic_number("1/2").unwrap(), 0.5);
        let one = LocalSpace::spin("s", 2);
        assert_eq!(one.basis().unwrap(), ["-1", "0", "1"]);
        assert_eq!(one.spin_j().unwrap(), 1.0);
        assert_eq!(one.magnetic_number("-1").unwrap(), -1.0);
    }
}
