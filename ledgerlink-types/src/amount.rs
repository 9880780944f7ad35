//! Fixed-point amounts and signed balances.
//!
//! Amounts never pass through floating point. On the wire both halves of a
//! [`FixedPoint`] are decimal strings so they survive JSON parsers that would
//! otherwise coerce large integers to doubles.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Number of decimal digits carried by the fraction half.
pub const FRACTION_DIGITS: u32 = 18;

/// `10^FRACTION_DIGITS`; the fraction half is always below this.
pub const FRACTION_SCALE: u64 = 1_000_000_000_000_000_000;

/// A non-negative fixed-point number: `integer + fraction / FRACTION_SCALE`.
///
/// Used for line magnitudes, exchange rates and budget amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "WireFixedPoint", into = "WireFixedPoint")]
pub struct FixedPoint {
    integer: u64,
    fraction: u64,
}

#[derive(Serialize, Deserialize)]
struct WireFixedPoint {
    integer: String,
    fraction: String,
}

impl TryFrom<WireFixedPoint> for FixedPoint {
    type Error = Error;

    fn try_from(wire: WireFixedPoint) -> Result<Self, Self::Error> {
        let integer = wire
            .integer
            .parse::<u64>()
            .map_err(|e| Error::InvalidAmount(format!("integer {:?}: {e}", wire.integer)))?;
        let fraction = wire
            .fraction
            .parse::<u64>()
            .map_err(|e| Error::InvalidAmount(format!("fraction {:?}: {e}", wire.fraction)))?;
        FixedPoint::new(integer, fraction)
    }
}

impl From<FixedPoint> for WireFixedPoint {
    fn from(value: FixedPoint) -> Self {
        Self {
            integer: value.integer.to_string(),
            fraction: value.fraction.to_string(),
        }
    }
}

impl FixedPoint {
    pub const ZERO: FixedPoint = FixedPoint { integer: 0, fraction: 0 };

    /// Creates a fixed-point value, rejecting fractions at or above the scale.
    pub fn new(integer: u64, fraction: u64) -> crate::Result<Self> {
        if fraction >= FRACTION_SCALE {
            return Err(Error::InvalidAmount(format!(
                "fraction {fraction} exceeds {FRACTION_DIGITS} digits"
            )));
        }
        Ok(Self { integer, fraction })
    }

    /// Creates a whole-number value.
    #[must_use]
    pub const fn from_integer(integer: u64) -> Self {
        Self { integer, fraction: 0 }
    }

    #[must_use]
    pub const fn integer(&self) -> u64 {
        self.integer
    }

    #[must_use]
    pub const fn fraction(&self) -> u64 {
        self.fraction
    }

    /// Total value in units of `1 / FRACTION_SCALE`.
    #[must_use]
    pub fn units(&self) -> u128 {
        u128::from(self.integer) * u128::from(FRACTION_SCALE) + u128::from(self.fraction)
    }

    /// Builds a value from scaled units.
    pub fn from_units(units: u128) -> crate::Result<Self> {
        let scale = u128::from(FRACTION_SCALE);
        let integer = u64::try_from(units / scale)
            .map_err(|_| Error::InvalidAmount(format!("{units} units overflow")))?;
        Ok(Self {
            integer,
            fraction: (units % scale) as u64,
        })
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.integer == 0 && self.fraction == 0
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_decimal(f, false, u128::from(self.integer), self.fraction)
    }
}

impl FromStr for FixedPoint {
    type Err = Error;

    /// Parses a plain decimal such as `"500"` or `"0.125"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (integer, fraction) = parse_decimal(s)?;
        let integer = u64::try_from(integer)
            .map_err(|_| Error::InvalidAmount(format!("{s:?}: integer part too large")))?;
        FixedPoint::new(integer, fraction)
    }
}

/// Splits an unsigned decimal into its integer part and its fraction scaled
/// to `FRACTION_DIGITS`.
fn parse_decimal(s: &str) -> crate::Result<(u128, u64)> {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty()
        || !digits_only(int_part)
        || frac_part.len() > FRACTION_DIGITS as usize
        || !digits_only(frac_part)
    {
        return Err(Error::InvalidAmount(format!("{s:?}")));
    }
    let integer = int_part
        .parse::<u128>()
        .map_err(|e| Error::InvalidAmount(format!("{s:?}: {e}")))?;
    let fraction = if frac_part.is_empty() {
        0
    } else {
        format!("{frac_part:0<width$}", width = FRACTION_DIGITS as usize)
            .parse::<u64>()
            .map_err(|e| Error::InvalidAmount(format!("{s:?}: {e}")))?
    };
    Ok((integer, fraction))
}

/// Direction of a transaction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    /// `1` or `-1`, the on-disk representation.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        match self {
            Sign::Positive => 1,
            Sign::Negative => -1,
        }
    }

    pub fn from_i64(value: i64) -> crate::Result<Self> {
        match value {
            1 => Ok(Sign::Positive),
            -1 => Ok(Sign::Negative),
            other => Err(Error::InvalidAmount(format!("sign {other}"))),
        }
    }
}

impl TryFrom<i8> for Sign {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        Sign::from_i64(i64::from(value))
    }
}

impl From<Sign> for i8 {
    fn from(sign: Sign) -> Self {
        sign.as_i64() as i8
    }
}

/// A signed fixed-point balance in units of `1 / FRACTION_SCALE`.
///
/// Account balances are cached sums of signed line magnitudes; this type is
/// the accumulator and the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(i128);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    #[must_use]
    pub const fn from_units(units: i128) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn units(&self) -> i128 {
        self.0
    }

    /// The signed contribution of one line.
    #[must_use]
    pub fn of_line(sign: Sign, magnitude: &FixedPoint) -> Self {
        let units = magnitude.units() as i128;
        match sign {
            Sign::Positive => Self(units),
            Sign::Negative => Self(-units),
        }
    }

    /// Whole-unit balance, handy in tests and fixtures.
    #[must_use]
    pub const fn from_integer(integer: i64) -> Self {
        Self(integer as i128 * FRACTION_SCALE as i128)
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Self) -> Self::Output {
        Balance(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Balance {
    type Output = Balance;

    fn sub(self, rhs: Self) -> Self::Output {
        Balance(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Balance {
    type Output = Balance;

    fn neg(self) -> Self::Output {
        Balance(self.0.saturating_neg())
    }
}

impl std::iter::Sum for Balance {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Balance::ZERO, |acc, b| acc + b)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let scale = u128::from(FRACTION_SCALE);
        write_decimal(f, self.0 < 0, abs / scale, (abs % scale) as u64)
    }
}

impl FromStr for Balance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (integer, fraction) = parse_decimal(rest)?;
        let out_of_range = || Error::InvalidAmount(format!("{s:?}: outside balance range"));
        let units = integer
            .checked_mul(u128::from(FRACTION_SCALE))
            .and_then(|u| u.checked_add(u128::from(fraction)))
            .ok_or_else(out_of_range)?;
        let units = if negative {
            0i128.checked_sub_unsigned(units)
        } else {
            i128::try_from(units).ok()
        };
        units.map(Balance).ok_or_else(out_of_range)
    }
}

impl Serialize for Balance {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn write_decimal(
    f: &mut fmt::Formatter<'_>,
    negative: bool,
    integer: u128,
    fraction: u64,
) -> fmt::Result {
    if negative {
        f.write_str("-")?;
    }
    write!(f, "{integer}")?;
    if fraction != 0 {
        let digits = format!("{fraction:0width$}", width = FRACTION_DIGITS as usize);
        write!(f, ".{}", digits.trim_end_matches('0'))?;
    }
    Ok(())
}
