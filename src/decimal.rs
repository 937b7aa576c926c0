//! Deterministic fixed-precision decimal arithmetic.
//!
//! All monetary and ratio quantities in the ledger are stored as scaled
//! `i64` minor units rather than `f64`, so that addition and subtraction
//! are exact and every division/conversion rounds through a single,
//! documented rule (half-up, ties toward positive infinity) rather than
//! accumulating IEEE-754 representation error across replays.
//!
//! Each quantity class gets its own newtype (`Cents`, `Lots`, `Price`,
//! `Ratio`) wrapping a [`Fixed`] of the appropriate scale, so a price can
//! never be silently added to a lot size.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Scaled fixed-point integer with `DP` decimal places.
///
/// Stored as minor units: `Fixed::<2>(12345)` represents `123.45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed<const DP: u32>(i64);

impl<const DP: u32> Fixed<DP> {
    pub const ZERO: Self = Fixed(0);

    fn scale() -> i64 {
        10i64.pow(DP)
    }

    /// Construct directly from minor units (no rounding).
    pub const fn from_minor_units(units: i64) -> Self {
        Fixed(units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Round a floating value to this scale using half-up rounding
    /// (ties resolve toward positive infinity), after nudging by a small
    /// bias to defeat binary representation error in values that are
    /// conceptually exact decimals (e.g. `0.1 + 0.2`).
    pub fn from_f64(value: f64) -> Self {
        const EPS: f64 = 1e-9;
        let scaled = value * Self::scale() as f64;
        // floor(x + 0.5) is half-up rounding with ties resolving toward
        // positive infinity for any sign of x; EPS nudges values that are
        // conceptually exact ties but landed a hair off due to binary
        // floating-point representation (e.g. 1.005 stored as
        // 1.00499999999999989...).
        Fixed((scaled + 0.5 + EPS).floor() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::scale() as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn abs(self) -> Self {
        Fixed(self.0.abs())
    }

    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Canonical decimal string: fixed `DP` places, no scientific
    /// notation, single leading zero before the point, and (by
    /// construction, since zero has no sign in `i64`) no `-0.00`.
    pub fn canonical_string(self) -> String {
        let scale = Self::scale();
        let neg = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / scale as u64;
        let frac = abs % scale as u64;
        if DP == 0 {
            format!("{}{}", if neg { "-" } else { "" }, whole)
        } else {
            format!(
                "{}{}.{:0width$}",
                if neg { "-" } else { "" },
                whole,
                frac,
                width = DP as usize
            )
        }
    }

    /// Parse a previously-produced canonical string back into a `Fixed`.
    /// Used only to validate the canonical-decimal law in tests.
    pub fn parse_canonical(s: &str) -> Option<Self> {
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let mut parts = s.splitn(2, '.');
        let whole: i64 = parts.next()?.parse().ok()?;
        let frac_str = parts.next().unwrap_or("");
        if frac_str.len() != DP as usize {
            return None;
        }
        let frac: i64 = if DP == 0 {
            0
        } else {
            frac_str.parse().ok()?
        };
        let magnitude = whole * Self::scale() + frac;
        Some(Fixed(if neg { -magnitude } else { magnitude }))
    }
}

impl<const DP: u32> Add for Fixed<DP> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Fixed(self.0 + rhs.0)
    }
}

impl<const DP: u32> Sub for Fixed<DP> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Fixed(self.0 - rhs.0)
    }
}

impl<const DP: u32> Neg for Fixed<DP> {
    type Output = Self;
    fn neg(self) -> Self {
        Fixed(-self.0)
    }
}

impl<const DP: u32> Default for Fixed<DP> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const DP: u32> fmt::Display for Fixed<DP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

impl<const DP: u32> Serialize for Fixed<DP> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical_string())
    }
}

impl<'de, const DP: u32> Deserialize<'de> for Fixed<DP> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Accept either a JSON number or a canonical string, since events
        // arrive from the agent as plain numbers but reports round-trip
        // as canonical strings.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => {
                let f = n.as_f64().ok_or_else(|| serde::de::Error::custom("non-finite number"))?;
                Ok(Fixed::from_f64(f))
            }
            serde_json::Value::String(s) => Fixed::<DP>::parse_canonical(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal string: {s}"))),
            other => Err(serde::de::Error::custom(format!("expected number or string, got {other}"))),
        }
    }
}

/// Division by zero yields zero rather than panicking or producing NaN/inf.
pub fn checked_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

macro_rules! decimal_newtype {
    ($name:ident, $dp:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Fixed<$dp>);

        impl $name {
            pub const ZERO: Self = $name(Fixed::ZERO);

            pub fn from_f64(value: f64) -> Self {
                $name(Fixed::from_f64(value))
            }

            pub fn from_minor_units(units: i64) -> Self {
                $name(Fixed::from_minor_units(units))
            }

            pub fn minor_units(self) -> i64 {
                self.0.minor_units()
            }

            pub fn to_f64(self) -> f64 {
                self.0.to_f64()
            }

            pub fn is_zero(self) -> bool {
                self.0.is_zero()
            }

            pub fn abs(self) -> Self {
                $name(self.0.abs())
            }

            pub fn max(self, other: Self) -> Self {
                $name(self.0.max(other.0))
            }

            pub fn canonical_string(self) -> String {
                self.0.canonical_string()
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                $name(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                $name(-self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl PartialOrd<f64> for $name {
            fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
                self.to_f64().partial_cmp(other)
            }
        }
        impl PartialEq<f64> for $name {
            fn eq(&self, other: &f64) -> bool {
                (self.to_f64() - other).abs() < 10f64.powi(-($dp as i32) - 1)
            }
        }
    };
}

decimal_newtype!(Cents, 2, "Monetary amount, 2 decimal places (cents).");
decimal_newtype!(Lots, 2, "Position size in lots, 2 decimal places.");
decimal_newtype!(Price, 8, "Instrument price, 8 decimal places.");
decimal_newtype!(Ratio, 4, "Percentage or ratio, 4 decimal places.");

impl Ratio {
    /// `(numerator / denominator) * 100`, rounded to 4dp; zero if
    /// `denominator` is zero.
    pub fn percent_of(numerator: Cents, denominator: Cents) -> Self {
        let d = denominator.to_f64();
        if d == 0.0 {
            return Ratio::ZERO;
        }
        Ratio::from_f64(numerator.to_f64() / d * 100.0)
    }

    pub fn ratio_of(numerator: Cents, denominator: Cents) -> Self {
        let d = denominator.to_f64();
        if d == 0.0 {
            return Ratio::ZERO;
        }
        Ratio::from_f64(numerator.to_f64() / d)
    }
}
