//! Symbolic scalar coefficients.
//!
//! Scalars are kept in a canonical form as they are built: sums and products
//! are flattened, numeric parts are folded, like terms and equal bases are
//! collected, and operands are sorted. Two scalars that are equal after these
//! rules compare equal structurally.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, AlgebraResult};

/// A complex floating-point constant with a total order.
///
/// On construction a component below a few ulps of the larger component is
/// rounded to zero, so `exp(iπ)` is exactly `-1`. Negative zero is
/// normalised to zero so that equality, ordering and hashing agree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "Complex64", into = "Complex64")]
pub struct Number(Complex64);

/// Relative size below which a component is rounding noise.
const ROUNDING_NOISE: f64 = 4.0 * f64::EPSILON;

fn normalize(x: f64, tolerance: f64) -> f64 {
    if x == 0.0 || x.abs() < tolerance { 0.0 } else { x }
}

impl Number {
    /// Create a number from its real and imaginary parts.
    pub fn new(re: f64, im: f64) -> Self {
        let scale = re.abs().max(im.abs());
        let tolerance = if scale.is_finite() { ROUNDING_NOISE * scale } else { 0.0 };
        Number(Complex64::new(normalize(re, tolerance), normalize(im, tolerance)))
    }

    /// The complex value.
    pub fn value(self) -> Complex64 {
        self.0
    }

    /// Real part.
    pub fn re(self) -> f64 {
        self.0.re
    }

    /// Imaginary part.
    pub fn im(self) -> f64 {
        self.0.im
    }

    /// Whether this is exactly zero.
    pub fn is_zero(self) -> bool {
        self.0.re == 0.0 && self.0.im == 0.0
    }

    /// Whether this is exactly one.
    pub fn is_one(self) -> bool {
        self.0.re == 1.0 && self.0.im == 0.0
    }
}

impl From<Complex64> for Number {
    fn from(value: Complex64) -> Self {
        Number::new(value.re, value.im)
    }
}

impl From<Number> for Complex64 {
    fn from(value: Number) -> Self {
        value.0
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .re
            .total_cmp(&other.0.re)
            .then_with(|| self.0.im.total_cmp(&other.0.im))
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.re.to_bits().hash(state);
        self.0.im.to_bits().hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Complex64 { re, im } = self.0;
        match (re == 0.0, im == 0.0) {
            (_, true) => write!(f, "{re}"),
            (true, false) => write!(f, "{im}i"),
            (false, false) if im < 0.0 => write!(f, "({re}-{}i)", -im),
            (false, false) => write!(f, "({re}+{im}i)"),
        }
    }
}

/// A symbolic scalar expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scalar {
    /// A numeric constant.
    Number(Number),
    /// A named parameter. Real symbols are their own complex conjugate.
    Symbol {
        /// The parameter name.
        name: String,
        /// Whether the parameter is known to be real.
        real: bool,
    },
    /// A sum of at least two terms.
    Sum(Vec<Scalar>),
    /// A product of at least two factors; a numeric factor comes first.
    Product(Vec<Scalar>),
    /// An integer power of a non-numeric base.
    Power(Box<Scalar>, i32),
    /// Complex conjugate of a complex symbol.
    Conjugate(Box<Scalar>),
    /// The exponential function.
    Exp(Box<Scalar>),
}

impl Scalar {
    /// The constant zero.
    pub fn zero() -> Self {
        Scalar::Number(Number::new(0.0, 0.0))
    }

    /// The constant one.
    pub fn one() -> Self {
        Scalar::Number(Number::new(1.0, 0.0))
    }

    /// The imaginary unit.
    pub fn i() -> Self {
        Scalar::Number(Number::new(0.0, 1.0))
    }

    /// A complex constant.
    pub fn number(value: Complex64) -> Self {
        Scalar::Number(value.into())
    }

    /// A real constant.
    pub fn real(value: f64) -> Self {
        Scalar::Number(Number::new(value, 0.0))
    }

    /// A complex-valued symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Scalar::Symbol {
            name: name.into(),
            real: false,
        }
    }

    /// A real-valued symbol.
    pub fn real_symbol(name: impl Into<String>) -> Self {
        Scalar::Symbol {
            name: name.into(),
            real: true,
        }
    }

    /// Whether this is the constant zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, Scalar::Number(n) if n.is_zero())
    }

    /// Whether this is the constant one.
    pub fn is_one(&self) -> bool {
        matches!(self, Scalar::Number(n) if n.is_one())
    }

    /// The numeric value, if this scalar is a constant.
    pub fn as_number(&self) -> Option<Complex64> {
        match self {
            Scalar::Number(n) => Some(n.value()),
            _ => None,
        }
    }

    /// Names of all symbols in the expression.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        self.collect_symbols(&mut set);
        set
    }

    fn collect_symbols(&self, set: &mut BTreeSet<String>) {
        match self {
            Scalar::Number(_) => {}
            Scalar::Symbol { name, .. } => {
                set.insert(name.clone());
            }
            Scalar::Sum(ops) | Scalar::Product(ops) => {
                for op in ops {
                    op.collect_symbols(set);
                }
            }
            Scalar::Power(b, _) | Scalar::Conjugate(b) | Scalar::Exp(b) => b.collect_symbols(set),
        }
    }

    /// Canonical sum of `terms`.
    pub fn sum(terms: impl IntoIterator<Item = Scalar>) -> Self {
        let mut flat = Vec::new();
        flatten_into(terms, &mut flat, |s| match s {
            Scalar::Sum(ops) => Ok(ops),
            other => Err(other),
        });

        let mut constant = Complex64::new(0.0, 0.0);
        let mut collected: Vec<(Scalar, Complex64)> = Vec::new();
        for term in flat {
            if let Scalar::Number(n) = term {
                constant += n.value();
                continue;
            }
            let (coeff, rest) = term.split_coefficient();
            match collected.iter_mut().find(|(t, _)| *t == rest) {
                Some((_, c)) => *c += coeff,
                None => collected.push((rest, coeff)),
            }
        }

        let mut result: Vec<Scalar> = collected
            .into_iter()
            .filter(|(_, c)| *c != Complex64::new(0.0, 0.0))
            .map(|(t, c)| Scalar::product([Scalar::number(c), t]))
            .collect();
        if constant != Complex64::new(0.0, 0.0) {
            result.push(Scalar::number(constant));
        }
        result.sort();

        match result.len() {
            0 => Scalar::zero(),
            1 => result.remove(0),
            _ => Scalar::Sum(result),
        }
    }

    /// Canonical product of `factors`.
    pub fn product(factors: impl IntoIterator<Item = Scalar>) -> Self {
        let mut flat = Vec::new();
        flatten_into(factors, &mut flat, |s| match s {
            Scalar::Product(ops) => Ok(ops),
            other => Err(other),
        });

        let mut coeff = Complex64::new(1.0, 0.0);
        let mut exponent = Vec::new();
        let mut bases: Vec<(Scalar, i32)> = Vec::new();
        for factor in flat {
            let (base, power) = match factor {
                Scalar::Number(n) => {
                    coeff *= n.value();
                    continue;
                }
                Scalar::Exp(arg) => {
                    exponent.push(*arg);
                    continue;
                }
                Scalar::Power(base, power) => (*base, power),
                other => (other, 1),
            };
            match bases.iter_mut().find(|(b, _)| *b == base) {
                Some((_, p)) => *p += power,
                None => bases.push((base, power)),
            }
        }
        if !exponent.is_empty() {
            match Scalar::sum(exponent).exp() {
                Scalar::Number(n) => coeff *= n.value(),
                e => bases.push((e, 1)),
            }
        }
        if coeff == Complex64::new(0.0, 0.0) {
            return Scalar::zero();
        }

        let mut result: Vec<Scalar> = bases
            .into_iter()
            .filter(|(_, p)| *p != 0)
            .map(|(b, p)| if p == 1 { b } else { Scalar::Power(Box::new(b), p) })
            .collect();
        result.sort();

        let coeff = Number::from(coeff);
        if result.is_empty() {
            return Scalar::Number(coeff);
        }
        if coeff.is_one() {
            if result.len() == 1 {
                return result.remove(0);
            }
        } else {
            result.insert(0, Scalar::Number(coeff));
        }
        Scalar::Product(result)
    }

    /// Split off the numeric prefactor: `self == coeff * rest`.
    fn split_coefficient(self) -> (Complex64, Scalar) {
        match self {
            Scalar::Number(n) => (n.value(), Scalar::one()),
            Scalar::Product(mut ops) => match ops.first() {
                Some(Scalar::Number(n)) => {
                    let c = n.value();
                    ops.remove(0);
                    let rest = if ops.len() == 1 {
                        ops.remove(0)
                    } else {
                        Scalar::Product(ops)
                    };
                    (c, rest)
                }
                _ => (Complex64::new(1.0, 0.0), Scalar::Product(ops)),
            },
            other => (Complex64::new(1.0, 0.0), other),
        }
    }

    /// Integer power. Fails for negative powers of zero.
    pub fn powi(&self, e: i32) -> AlgebraResult<Scalar> {
        if e == 0 {
            return Ok(Scalar::one());
        }
        if e == 1 {
            return Ok(self.clone());
        }
        Ok(match self {
            Scalar::Number(n) => {
                if n.is_zero() {
                    if e < 0 {
                        return Err(AlgebraError::DivisionByZero);
                    }
                    Scalar::zero()
                } else {
                    Scalar::number(n.value().powi(e))
                }
            }
            Scalar::Power(b, p) => match p.checked_mul(e) {
                Some(pe) => b.powi(pe)?,
                None => Scalar::Power(Box::new(self.clone()), e),
            },
            Scalar::Product(ops) => {
                let factors = ops.iter().map(|f| f.powi(e)).collect::<AlgebraResult<Vec<_>>>()?;
                Scalar::product(factors)
            }
            Scalar::Exp(arg) => (arg.as_ref().clone() * Scalar::real(f64::from(e))).exp(),
            other => Scalar::Power(Box::new(other.clone()), e),
        })
    }

    /// Multiplicative inverse.
    pub fn inverse(&self) -> AlgebraResult<Scalar> {
        self.powi(-1)
    }

    /// `self / rhs`.
    pub fn checked_div(&self, rhs: &Scalar) -> AlgebraResult<Scalar> {
        Ok(Scalar::product([self.clone(), rhs.inverse()?]))
    }

    /// Complex conjugate.
    pub fn conj(&self) -> Scalar {
        match self {
            Scalar::Number(n) => Scalar::number(n.value().conj()),
            Scalar::Symbol { real: true, .. } => self.clone(),
            Scalar::Symbol { real: false, .. } => Scalar::Conjugate(Box::new(self.clone())),
            Scalar::Conjugate(inner) => inner.as_ref().clone(),
            Scalar::Sum(ops) => Scalar::sum(ops.iter().map(Scalar::conj)),
            Scalar::Product(ops) => Scalar::product(ops.iter().map(Scalar::conj)),
            Scalar::Power(b, e) => Scalar::Power(Box::new(b.conj()), *e),
            Scalar::Exp(arg) => arg.conj().exp(),
        }
    }

    /// The exponential function, evaluated for constants.
    pub fn exp(&self) -> Scalar {
        match self {
            Scalar::Number(n) if n.is_zero() => Scalar::one(),
            Scalar::Number(n) => Scalar::number(n.value().exp()),
            other => Scalar::Exp(Box::new(other.clone())),
        }
    }

    /// Replace the symbol `name` by `value`.
    pub fn substitute(&self, name: &str, value: &Scalar) -> AlgebraResult<Scalar> {
        Ok(match self {
            Scalar::Number(_) => self.clone(),
            Scalar::Symbol { name: n, .. } if n == name => value.clone(),
            Scalar::Symbol { .. } => self.clone(),
            Scalar::Sum(ops) => Scalar::sum(
                ops.iter()
                    .map(|o| o.substitute(name, value))
                    .collect::<AlgebraResult<Vec<_>>>()?,
            ),
            Scalar::Product(ops) => Scalar::product(
                ops.iter()
                    .map(|o| o.substitute(name, value))
                    .collect::<AlgebraResult<Vec<_>>>()?,
            ),
            Scalar::Power(b, e) => b.substitute(name, value)?.powi(*e)?,
            Scalar::Conjugate(b) => b.substitute(name, value)?.conj(),
            Scalar::Exp(b) => b.substitute(name, value)?.exp(),
        })
    }
}

fn flatten_into(
    items: impl IntoIterator<Item = Scalar>,
    out: &mut Vec<Scalar>,
    split: fn(Scalar) -> Result<Vec<Scalar>, Scalar>,
) {
    for item in items {
        match split(item) {
            Ok(inner) => flatten_into(inner, out, split),
            Err(leaf) => out.push(leaf),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Symbol { name, .. } => write!(f, "{name}"),
            Scalar::Sum(ops) => {
                write!(f, "(")?;
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, ")")
            }
            Scalar::Product(ops) => {
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{op}")?;
                }
                Ok(())
            }
            Scalar::Power(b, e) => write!(f, "{b}^{e}"),
            Scalar::Conjugate(b) => write!(f, "conj({b})"),
            Scalar::Exp(b) => write!(f, "exp({b})"),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::real(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::real(f64::from(value))
    }
}

impl From<Complex64> for Scalar {
    fn from(value: Complex64) -> Self {
        Scalar::number(value)
    }
}

impl From<Number> for Scalar {
    fn from(value: Number) -> Self {
        Scalar::Number(value)
    }
}

impl std::ops::Add for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Self) -> Self::Output {
        Scalar::sum([self, rhs])
    }
}

impl std::ops::Sub for Scalar {
    type Output = Scalar;

    fn sub(self, rhs: Self) -> Self::Output {
        Scalar::sum([self, -rhs])
    }
}

impl std::ops::Mul for Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Self) -> Self::Output {
        Scalar::product([self, rhs])
    }
}

impl std::ops::Neg for Scalar {
    type Output = Scalar;

    fn neg(self) -> Self::Output {
        Scalar::product([Scalar::real(-1.0), self])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_normalizes_negative_zero() {
        assert_eq!(Number::new(-0.0, 0.0), Number::new(0.0, -0.0));
        assert!(Scalar::real(-0.0).is_zero());
    }

    #[test]
    fn test_like_terms() {
        let x = Scalar::symbol("x");
        let sum = x.clone() + x.clone();
        assert_eq!(sum, Scalar::real(2.0) * x.clone());
        assert_eq!(x.clone() - x, Scalar::zero());
    }

    #[test]
    fn test_numbers_fold() {
        let sum = Scalar::real(1.5) + Scalar::i() + Scalar::real(0.5);
        assert_eq!(sum.as_number(), Some(Complex64::new(2.0, 1.0)));
    }

    #[test]
    fn test_sum_is_commutative() {
        let x = Scalar::symbol("x");
        let y = Scalar::symbol("y");
        assert_eq!(x.clone() + y.clone(), y + x);
    }

    #[test]
    fn test_powers_merge() {
        let x = Scalar::symbol("x");
        let sq = x.clone() * x.clone();
        assert_eq!(sq, x.powi(2).unwrap());
        assert_eq!(sq.checked_div(&x).unwrap(), x);
    }

    #[test]
    fn test_zero_annihilates() {
        let x = Scalar::symbol("x");
        assert!((Scalar::zero() * x).is_zero());
    }

    #[test]
    fn test_inverse_of_zero() {
        assert_eq!(Scalar::zero().inverse(), Err(AlgebraError::DivisionByZero));
        assert_eq!(Scalar::real(4.0).inverse().unwrap(), Scalar::real(0.25));
    }

    #[test]
    fn test_conjugate() {
        let z = Scalar::symbol("z");
        let r = Scalar::real_symbol("r");
        assert_eq!(z.conj().conj(), z);
        assert_eq!(r.conj(), r);
        assert_eq!(
            Scalar::number(Complex64::new(1.0, 2.0)).conj(),
            Scalar::number(Complex64::new(1.0, -2.0))
        );
    }

    #[test]
    fn test_exp_merges() {
        let a = Scalar::symbol("a");
        let product = a.exp() * (-a).exp();
        assert!(product.is_one());
    }

    #[test]
    fn test_rounding_noise_is_dropped() {
        let minus_one = (Scalar::i() * Scalar::real(std::f64::consts::PI)).exp();
        assert_eq!(minus_one, Scalar::real(-1.0));
        assert_eq!(Number::new(1e-300, 0.0), Number::new(1e-300, 0.0));
        assert_ne!(Number::new(1e-300, 0.0), Number::new(0.0, 0.0));
        assert_eq!(Number::new(f64::INFINITY, 1.0).im(), 1.0);
    }

    #[test]
    fn test_numbers_normalised_when_deserialized() {
        let n: Number = serde_json::from_str("[-0.0, 2.0]").unwrap();
        assert_eq!(n, Number::new(0.0, 2.0));
        assert_eq!(serde_json::to_string(&n).unwrap(), "[0.0,2.0]");
    }

    #[test]
    fn test_nested_power_overflow() {
        let x = Scalar::symbol("x");
        let big = x.powi(1 << 20).unwrap();
        let nested = big.powi(1 << 20).unwrap();
        assert_eq!(nested, Scalar::Power(Box::new(big.clone()), 1 << 20));
        assert_eq!(big.powi(2).unwrap(), x.powi(1 << 21).unwrap());
    }

    #[test]
    fn test_substitute() {
        let x = Scalar::symbol("x");
        let expr = Scalar::real(3.0) * x.clone() + Scalar::one();
        let value = expr.substitute("x", &Scalar::real(2.0)).unwrap();
        assert_eq!(value, Scalar::real(7.0));
        assert_eq!(expr.symbols().into_iter().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Scalar::real(2.0).to_string(), "2");
        assert_eq!(Scalar::i().to_string(), "1i");
        assert_eq!(Scalar::symbol("g").to_string(), "g");
    }
}
