//! Numeric values independent of the element type of the data they came from.
//!
//! Two representations are used:
//!
//! * [DValue] is the JSON number used in manifests and missing data descriptors. It can hold
//!   any finite value of a supported [DType](crate::models::DType).
//! * [Scalar] is the value carried by partial and final reduction results. It keeps integer
//!   precision and can represent non-finite floats.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::error::ActiveStorageError;

/// A value of any DType, as written in JSON.
///
/// The number type is an enum over i64, u64 and f64, with the additional constraint that floating
/// point numbers must be finite.
pub type DValue = serde_json::Number;

fn incompatible(value: &DValue) -> ActiveStorageError {
    ActiveStorageError::IncompatibleMissing(value.clone())
}

/// Attempt to convert from a [DValue] to a specific numeric type.
// We can't implement TryFrom<DValue> for numeric types because the trait and types are foreign.
pub trait TryFromDValue: Sized {
    /// Try to convert from a [DValue] to a numeric type.
    fn try_from_dvalue(value: DValue) -> Result<Self, ActiveStorageError>;
}

macro_rules! try_from_dvalue_int {
    ($t:ty, $as:ident) => {
        impl TryFromDValue for $t {
            fn try_from_dvalue(value: DValue) -> Result<Self, ActiveStorageError> {
                let wide = value.$as().ok_or_else(|| incompatible(&value))?;
                <$t>::try_from(wide).map_err(|_| incompatible(&value))
            }
        }
    };
}

try_from_dvalue_int!(i32, as_i64);
try_from_dvalue_int!(i64, as_i64);
try_from_dvalue_int!(u32, as_u64);
try_from_dvalue_int!(u64, as_u64);

impl TryFromDValue for f32 {
    fn try_from_dvalue(value: DValue) -> Result<Self, ActiveStorageError> {
        // Values too large for an f32 become infinite here.
        let float = value.as_f64().ok_or_else(|| incompatible(&value))? as f32;
        if float.is_finite() {
            Ok(float)
        } else {
            Err(incompatible(&value))
        }
    }
}

impl TryFromDValue for f64 {
    fn try_from_dvalue(value: DValue) -> Result<Self, ActiveStorageError> {
        value.as_f64().ok_or_else(|| incompatible(&value))
    }
}

/// A reduced value.
///
/// Signed integers widen to [Scalar::Int], unsigned integers to [Scalar::Uint] and floats to
/// [Scalar::Float]. All partial results of one request share a variant because they come from
/// data of the same dtype. Mixed variants are compared and added as f64.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl Scalar {
    /// Returns the value as an f64, possibly losing precision.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Uint(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Returns true if this is a float NaN.
    pub fn is_nan(self) -> bool {
        matches!(self, Self::Float(v) if v.is_nan())
    }

    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (Self::Uint(a), Self::Uint(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    /// Returns the larger of two values. NaN is returned if either value is NaN.
    pub fn max(self, other: Self) -> Self {
        match self.compare(other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => Self::Float(f64::NAN),
        }
    }

    /// Returns the smaller of two values. NaN is returned if either value is NaN.
    pub fn min(self, other: Self) -> Self {
        match self.compare(other) {
            Some(Ordering::Greater) => other,
            Some(_) => self,
            None => Self::Float(f64::NAN),
        }
    }
}

impl std::ops::Add for Scalar {
    type Output = Self;

    /// Integer addition wraps on overflow, as NumPy's does.
    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.wrapping_add(b)),
            (Self::Uint(a), Self::Uint(b)) => Self::Uint(a.wrapping_add(b)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Conversion of array elements into [Scalar]s.
pub trait IntoScalar: Copy {
    fn into_scalar(self) -> Scalar;
}

macro_rules! into_scalar {
    ($variant:ident, $wide:ty, $($t:ty),+) => {
        $(
            impl IntoScalar for $t {
                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(<$wide>::from(self))
                }
            }
        )+
    };
}

into_scalar!(Int, i64, i32, i64);
into_scalar!(Uint, u64, u32, u64);
into_scalar!(Float, f64, f32, f64);
