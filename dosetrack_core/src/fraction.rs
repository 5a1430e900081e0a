//! Exact rational quantities for doses and supply.
//!
//! A [`Fraction`] is always stored in lowest terms with a positive
//! denominator, so two fractions describing the same value compare and hash
//! equal no matter how they were built. Every constructor, operator and
//! compound assignment funnels through the same reduction step.
//!
//! The canonical text form is `"n"`, `"n/d"` or `"w n/d"` with an optional
//! leading `-`, e.g. `"1 1/2"` or `"-3/4"`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A reduced rational number.
///
/// # Invariants
///
/// - `denominator > 0` (sign lives in the numerator)
/// - `gcd(|numerator|, denominator) == 1`
/// - zero is `0/1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fraction {
    numerator: i64,
    denominator: i64,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction {
        numerator: 0,
        denominator: 1,
    };

    pub const ONE: Fraction = Fraction {
        numerator: 1,
        denominator: 1,
    };

    /// Create a fraction from a numerator/denominator pair, reducing it.
    ///
    /// Fails with [`Error::InvalidFraction`] when `denominator <= 0`.
    pub fn new(numerator: i64, denominator: i64) -> Result<Self> {
        if denominator <= 0 {
            return Err(Error::InvalidFraction(format!(
                "{}/{}: denominator must be positive",
                numerator, denominator
            )));
        }
        Self::reduced(numerator as i128, denominator as i128)
    }

    pub const fn from_integer(n: i64) -> Self {
        Fraction {
            numerator: n,
            denominator: 1,
        }
    }

    /// Create a fraction from a mixed number `whole numerator/denominator`.
    ///
    /// The sign of `whole` applies to the whole quantity, so
    /// `from_mixed(-1, 1, 2)` is `-3/2`. The fractional part must be
    /// non-negative.
    pub fn from_mixed(whole: i64, numerator: i64, denominator: i64) -> Result<Self> {
        if denominator <= 0 || numerator < 0 {
            return Err(Error::InvalidFraction(format!(
                "{} {}/{}: fractional part must be non-negative over a positive denominator",
                whole, numerator, denominator
            )));
        }
        let magnitude =
            whole.unsigned_abs() as i128 * denominator as i128 + numerator as i128;
        let signed = if whole < 0 { -magnitude } else { magnitude };
        Self::reduced(signed, denominator as i128)
    }

    /// The single normalization path. `denominator` must be positive.
    fn reduced(numerator: i128, denominator: i128) -> Result<Self> {
        debug_assert!(denominator > 0);
        if numerator == 0 {
            return Ok(Self::ZERO);
        }
        let g = gcd(numerator.unsigned_abs(), denominator as u128) as i128;
        let n = numerator / g;
        let d = denominator / g;
        match (i64::try_from(n), i64::try_from(d)) {
            (Ok(numerator), Ok(denominator)) => Ok(Fraction {
                numerator,
                denominator,
            }),
            _ => Err(Error::InvalidFraction(format!(
                "{}/{} does not fit in 64 bits",
                n, d
            ))),
        }
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    pub fn is_negative(&self) -> bool {
        self.numerator < 0
    }

    pub fn is_integer(&self) -> bool {
        self.denominator == 1
    }

    /// Lossy conversion, for display and estimates only.
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    pub fn checked_add(self, other: Fraction) -> Result<Fraction> {
        let n = self.numerator as i128 * other.denominator as i128
            + other.numerator as i128 * self.denominator as i128;
        let d = self.denominator as i128 * other.denominator as i128;
        Self::reduced(n, d)
    }

    pub fn checked_sub(self, other: Fraction) -> Result<Fraction> {
        let n = self.numerator as i128 * other.denominator as i128
            - other.numerator as i128 * self.denominator as i128;
        let d = self.denominator as i128 * other.denominator as i128;
        Self::reduced(n, d)
    }

    pub fn checked_mul(self, other: Fraction) -> Result<Fraction> {
        let n = self.numerator as i128 * other.numerator as i128;
        let d = self.denominator as i128 * other.denominator as i128;
        Self::reduced(n, d)
    }

    /// Divide, failing with [`Error::DivisionByZero`] when `other` is zero.
    pub fn checked_div(self, other: Fraction) -> Result<Fraction> {
        self.checked_mul(other.reciprocal()?)
    }

    pub fn checked_neg(self) -> Result<Fraction> {
        Self::reduced(-(self.numerator as i128), self.denominator as i128)
    }

    /// `1 / self`, failing with [`Error::DivisionByZero`] on zero.
    pub fn reciprocal(self) -> Result<Fraction> {
        match self.numerator.cmp(&0) {
            Ordering::Equal => Err(Error::DivisionByZero),
            Ordering::Greater => Self::reduced(self.denominator as i128, self.numerator as i128),
            Ordering::Less => Self::reduced(
                -(self.denominator as i128),
                -(self.numerator as i128),
            ),
        }
    }

    /// Compare against a plain number. This is the only floating-point
    /// comparison path.
    pub fn partial_cmp_f64(&self, other: f64) -> Option<Ordering> {
        self.to_f64().partial_cmp(&other)
    }

    /// Canonical mixed-number text, identical to `Display`.
    pub fn to_mixed_string(&self) -> String {
        self.to_string()
    }

    /// Sum a sequence of fractions, reporting overflow instead of panicking.
    pub fn checked_sum<'a, I>(iter: I) -> Result<Fraction>
    where
        I: IntoIterator<Item = &'a Fraction>,
    {
        iter.into_iter()
            .try_fold(Fraction::ZERO, |acc, f| acc.checked_add(*f))
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn overflowed(err: Error) -> ! {
    panic!("fraction arithmetic overflow: {}", err)
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::ZERO
    }
}

impl From<i64> for Fraction {
    fn from(n: i64) -> Self {
        Fraction::from_integer(n)
    }
}

impl From<i32> for Fraction {
    fn from(n: i32) -> Self {
        Fraction::from_integer(n as i64)
    }
}

impl From<u32> for Fraction {
    fn from(n: u32) -> Self {
        Fraction::from_integer(n as i64)
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Operators follow integer semantics: a result that cannot be represented
// panics. Use the `checked_*` methods where overflow must be reported.

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, other: Fraction) -> Fraction {
        self.checked_add(other).unwrap_or_else(|e| overflowed(e))
    }
}

impl Sub for Fraction {
    type Output = Fraction;

    fn sub(self, other: Fraction) -> Fraction {
        self.checked_sub(other).unwrap_or_else(|e| overflowed(e))
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, other: Fraction) -> Fraction {
        self.checked_mul(other).unwrap_or_else(|e| overflowed(e))
    }
}

impl Neg for Fraction {
    type Output = Fraction;

    fn neg(self) -> Fraction {
        self.checked_neg().unwrap_or_else(|e| overflowed(e))
    }
}

impl AddAssign for Fraction {
    fn add_assign(&mut self, other: Fraction) {
        *self = *self + other;
    }
}

impl SubAssign for Fraction {
    fn sub_assign(&mut self, other: Fraction) {
        *self = *self - other;
    }
}

impl MulAssign for Fraction {
    fn mul_assign(&mut self, other: Fraction) {
        *self = *self * other;
    }
}

impl Sum for Fraction {
    fn sum<I: Iterator<Item = Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::ZERO, |acc, f| acc + f)
    }
}

impl<'a> Sum<&'a Fraction> for Fraction {
    fn sum<I: Iterator<Item = &'a Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::ZERO, |acc, f| acc + *f)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            return write!(f, "{}", self.numerator);
        }
        let sign = if self.numerator < 0 { "-" } else { "" };
        let magnitude = self.numerator.unsigned_abs();
        let denominator = self.denominator as u64;
        let whole = magnitude / denominator;
        let rest = magnitude % denominator;
        if whole == 0 {
            write!(f, "{}{}/{}", sign, rest, denominator)
        } else {
            write!(f, "{}{} {}/{}", sign, whole, rest, denominator)
        }
    }
}

impl FromStr for Fraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidFraction(format!("cannot parse {:?}", s));

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let parts: Vec<&str> = body.split_whitespace().collect();
        let (whole, numerator, denominator) = match parts.as_slice() {
            [single] => match single.split_once('/') {
                Some((n, d)) => (0, parse_digits(n).ok_or_else(invalid)?, parse_digits(d).ok_or_else(invalid)?),
                None => (parse_digits(single).ok_or_else(invalid)?, 0, 1),
            },
            [whole, frac] => {
                let (n, d) = frac.split_once('/').ok_or_else(invalid)?;
                (
                    parse_digits(whole).ok_or_else(invalid)?,
                    parse_digits(n).ok_or_else(invalid)?,
                    parse_digits(d).ok_or_else(invalid)?,
                )
            }
            _ => return Err(invalid()),
        };

        if denominator == 0 {
            return Err(Error::InvalidFraction(format!(
                "{:?}: denominator must be positive",
                s
            )));
        }

        let magnitude = (whole as i128)
            .checked_mul(denominator as i128)
            .and_then(|m| m.checked_add(numerator as i128))
            .ok_or_else(|| Error::InvalidFraction(format!("{:?} is out of range", s)))?;
        let signed = if negative { -magnitude } else { magnitude };
        Fraction::reduced(signed, denominator as i128)
    }
}

/// Parse an unsigned run of ASCII digits.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl TryFrom<String> for Fraction {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Fraction> for String {
    fn from(f: Fraction) -> String {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn frac(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    #[test]
    fn test_reduces_to_lowest_terms() {
        let f = frac(6, 8);
        assert_eq!(f.numerator(), 3);
        assert_eq!(f.denominator(), 4);

        let neg = frac(-10, 4);
        assert_eq!(neg.numerator(), -5);
        assert_eq!(neg.denominator(), 2);

        assert_eq!(frac(0, 17), Fraction::ZERO);
        assert_eq!(Fraction::ZERO.denominator(), 1);
    }

    #[test]
    fn test_equality_is_representation_independent() {
        assert_eq!(frac(1, 2), frac(2, 4));
        assert_eq!(frac(1, 2), Fraction::from_mixed(0, 3, 6).unwrap());
        assert_eq!(frac(3, 2), Fraction::from_mixed(1, 1, 2).unwrap());
        assert_eq!(frac(1, 2), "2/4".parse::<Fraction>().unwrap());

        let mut set = HashSet::new();
        set.insert(frac(1, 2));
        set.insert(frac(2, 4));
        set.insert(frac(1, 4) + frac(1, 4));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rejects_non_positive_denominator() {
        assert!(matches!(Fraction::new(1, 0), Err(Error::InvalidFraction(_))));
        assert!(matches!(Fraction::new(1, -2), Err(Error::InvalidFraction(_))));
        assert!(matches!(
            Fraction::from_mixed(1, 1, 0),
            Err(Error::InvalidFraction(_))
        ));
        assert!(matches!(
            Fraction::from_mixed(1, -1, 2),
            Err(Error::InvalidFraction(_))
        ));
    }

    #[test]
    fn test_mixed_constructor_applies_whole_sign() {
        assert_eq!(Fraction::from_mixed(-1, 1, 2).unwrap(), frac(-3, 2));
        assert_eq!(Fraction::from_mixed(2, 0, 5).unwrap(), Fraction::from(2));
    }

    #[test]
    fn test_arithmetic() {
        let half = frac(1, 2);
        let third = frac(1, 3);
        assert_eq!(half + third, frac(5, 6));
        assert_eq!(half - third, frac(1, 6));
        assert_eq!(half * third, frac(1, 6));
        assert_eq!(half.checked_div(third).unwrap(), frac(3, 2));
        assert_eq!(-half, frac(-1, 2));
        assert_eq!(frac(-2, 3).reciprocal().unwrap(), frac(-3, 2));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            Fraction::ZERO.reciprocal(),
            Err(Error::DivisionByZero)
        ));
        assert!(matches!(
            Fraction::ONE.checked_div(Fraction::ZERO),
            Err(Error::DivisionByZero)
        ));
    }

    #[test]
    fn test_add_then_subtract_is_exact() {
        let values = [
            frac(1, 3),
            frac(-7, 10),
            frac(22, 7),
            Fraction::from(5),
            frac(1, 1_000_003),
        ];
        for a in values {
            for b in values {
                assert_eq!(a + b - b, a, "a={} b={}", a, b);
            }
        }

        // A tenth added ten times is exactly one.
        let mut acc = Fraction::ZERO;
        for _ in 0..10 {
            acc += frac(1, 10);
        }
        assert_eq!(acc, Fraction::ONE);
    }

    #[test]
    fn test_compare_cross_multiplies() {
        assert!(frac(1, 3) < frac(1, 2));
        assert!(frac(-1, 2) < frac(-1, 3));
        assert!(frac(i64::MAX - 1, i64::MAX) < Fraction::ONE);
        assert_eq!(frac(2, 4).cmp(&frac(1, 2)), Ordering::Equal);
        assert_eq!(frac(1, 2).partial_cmp_f64(0.4), Some(Ordering::Greater));
        assert_eq!(frac(1, 2).partial_cmp_f64(f64::NAN), None);
    }

    #[test]
    fn test_predicates() {
        assert!(Fraction::ZERO.is_zero());
        assert!(frac(-1, 9).is_negative());
        assert!(!Fraction::ZERO.is_negative());
        assert!(Fraction::from(4).is_integer());
        assert!(!frac(1, 4).is_integer());
    }

    #[test]
    fn test_format_canonical_forms() {
        assert_eq!(Fraction::from(3).to_string(), "3");
        assert_eq!(frac(1, 2).to_string(), "1/2");
        assert_eq!(frac(3, 2).to_string(), "1 1/2");
        assert_eq!(frac(-3, 2).to_mixed_string(), "-1 1/2");
        assert_eq!(frac(-1, 4).to_string(), "-1/4");
        assert_eq!(Fraction::ZERO.to_string(), "0");
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!("3".parse::<Fraction>().unwrap(), Fraction::from(3));
        assert_eq!(" 1 1/2 ".parse::<Fraction>().unwrap(), frac(3, 2));
        assert_eq!("-1 1/2".parse::<Fraction>().unwrap(), frac(-3, 2));
        assert_eq!("-1/4".parse::<Fraction>().unwrap(), frac(-1, 4));
        assert_eq!("1 3/2".parse::<Fraction>().unwrap(), frac(5, 2));

        for bad in ["", "1/0", "a/2", "1 2", "1 -1/2", "--1", "1/2/3", "1 1/2 3"] {
            assert!(bad.parse::<Fraction>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_huge_mixed_number_is_an_error() {
        let max = u64::MAX;
        let text = format!("{} 1/{}", max, max);
        assert!(matches!(
            text.parse::<Fraction>(),
            Err(Error::InvalidFraction(_))
        ));
        assert!(matches!(
            format!("-{} 1/{}", max, max).parse::<Fraction>(),
            Err(Error::InvalidFraction(_))
        ));
        // In range after reduction still parses.
        assert_eq!(
            format!("0 {}/{}", max, max).parse::<Fraction>().unwrap(),
            Fraction::ONE
        );
    }

    #[test]
    fn test_format_parse_round_trip() {
        let samples = [
            Fraction::ZERO,
            frac(7, 3),
            frac(-7, 3),
            frac(1, 64),
            Fraction::from(i64::MAX),
            Fraction::from(i64::MIN),
            frac(i64::MIN + 1, i64::MAX),
        ];
        for f in samples {
            assert_eq!(f.to_string().parse::<Fraction>().unwrap(), f);
        }
    }

    #[test]
    fn test_serde_uses_text_form() {
        let json = serde_json::to_string(&frac(5, 4)).unwrap();
        assert_eq!(json, "\"1 1/4\"");
        let back: Fraction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frac(5, 4));
        assert!(serde_json::from_str::<Fraction>("\"1/0\"").is_err());
    }

    #[test]
    fn test_overflow_is_reported_by_checked_ops() {
        let big = Fraction::from(i64::MAX);
        assert!(matches!(
            big.checked_add(Fraction::ONE),
            Err(Error::InvalidFraction(_))
        ));
        assert!(Fraction::from(i64::MIN).checked_neg().is_err());
    }

    #[test]
    fn test_sum_and_accumulate() {
        let doses = vec![frac(1, 2), frac(1, 4), frac(1, 4)];
        let total: Fraction = doses.iter().sum();
        assert_eq!(total, Fraction::ONE);
        assert_eq!(Fraction::checked_sum(&doses).unwrap(), Fraction::ONE);

        let mut supply = Fraction::from(2);
        supply -= frac(1, 2);
        supply *= frac(2, 3);
        assert_eq!(supply, Fraction::ONE);
    }
}
