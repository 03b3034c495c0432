//! Missing data descriptors
//!
//! Variables in array files often describe their own missing data by convention, using
//! attributes such as `_FillValue`, `missing_value`, `valid_min`, `valid_max` and
//! `valid_range`. Elements
//! identified as missing are excluded from reductions in the same way as masked elements.
//! Supported descriptions:
//!
//! * A fill value, used for elements that were never written
//! * A single missing value
//! * Multiple missing values
//! * A valid minimum value
//! * A valid maximum value
//! * A valid range of values

use serde::{Deserialize, Serialize};
use validator::ValidationError;

use crate::error::ActiveStorageError;
use crate::models::DType;
use crate::types::value::TryFromDValue;
use crate::types::DValue;

/// Missing data
///
/// Generic over the type of the values. [`Missing<DValue>`] is the form found in variable
/// descriptions and manifests, and is converted to `Missing<T>` once the element type `T` of the
/// data is known.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Missing<T> {
    /// Fill value of unwritten elements
    FillValue(T),
    /// A single missing value
    MissingValue(T),
    /// Multiple missing values
    MissingValues(Vec<T>),
    /// Valid minimum
    ValidMin(T),
    /// Valid maximum
    ValidMax(T),
    /// Valid range (inclusive)
    ValidRange(T, T),
}

impl<T> Missing<T> {
    /// Convert every value of the descriptor, failing on the first value that can't be converted.
    fn try_map<U, E>(&self, f: impl Fn(&T) -> Result<U, E>) -> Result<Missing<U>, E> {
        Ok(match self {
            Missing::FillValue(value) => Missing::FillValue(f(value)?),
            Missing::MissingValue(value) => Missing::MissingValue(f(value)?),
            Missing::MissingValues(values) => {
                Missing::MissingValues(values.iter().map(&f).collect::<Result<Vec<U>, E>>()?)
            }
            Missing::ValidMin(min) => Missing::ValidMin(f(min)?),
            Missing::ValidMax(max) => Missing::ValidMax(f(max)?),
            Missing::ValidRange(min, max) => Missing::ValidRange(f(min)?, f(max)?),
        })
    }
}

impl Missing<DValue> {
    /// Validate a [`Missing<DValue>`] for a given [DType].
    pub fn validate(&self, dtype: DType) -> Result<(), ValidationError> {
        match dtype {
            DType::Int32 => Missing::<i32>::validate_dvalue(self),
            DType::Int64 => Missing::<i64>::validate_dvalue(self),
            DType::Uint32 => Missing::<u32>::validate_dvalue(self),
            DType::Uint64 => Missing::<u64>::validate_dvalue(self),
            DType::Float32 => Missing::<f32>::validate_dvalue(self),
            DType::Float64 => Missing::<f64>::validate_dvalue(self),
        }
    }
}

impl<T: PartialOrd + Serialize + TryFromDValue> Missing<T> {
    fn validate_dvalue(missing: &Missing<DValue>) -> Result<(), ValidationError> {
        let typed = Self::try_from(missing).map_err(|err| {
            let mut error = ValidationError::new("Missing data descriptor is invalid");
            error.add_param("error".into(), &err.to_string());
            error
        })?;
        if let Missing::ValidRange(min, max) = typed {
            if min >= max {
                let mut error =
                    ValidationError::new("Missing data valid range min must be less than max");
                error.add_param("min".into(), &min);
                error.add_param("max".into(), &max);
                return Err(error);
            }
        }
        Ok(())
    }
}

impl<T: TryFromDValue> TryFrom<&Missing<DValue>> for Missing<T> {
    type Error = ActiveStorageError;

    fn try_from(missing: &Missing<DValue>) -> Result<Self, Self::Error> {
        missing.try_map(|value| T::try_from_dvalue(value.clone()))
    }
}

impl<T: PartialOrd> Missing<T> {
    /// Returns whether `x` is a missing value.
    pub fn is_missing(&self, x: &T) -> bool {
        match self {
            Missing::FillValue(value) | Missing::MissingValue(value) => x == value,
            Missing::MissingValues(values) => values.contains(x),
            Missing::ValidMin(min) => x < min,
            Missing::ValidMax(max) => x > max,
            Missing::ValidRange(min, max) => x < min || x > max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialise() {
        let missing: Missing<DValue> = serde_json::from_str(r#"{"valid_range": [0, 10]}"#).unwrap();
        assert_eq!(Missing::ValidRange(0.into(), 10.into()), missing);
        let missing: Missing<DValue> =
            serde_json::from_str(r#"{"missing_value": 1e20}"#).unwrap();
        assert_eq!(
            Missing::MissingValue(DValue::from_f64(1e20).unwrap()),
            missing
        );
    }

    #[test]
    fn test_deserialise_fill_value() {
        let missing: Missing<DValue> = serde_json::from_str(r#"{"fill_value": -1}"#).unwrap();
        assert_eq!(Missing::FillValue((-1).into()), missing);
        let typed = Missing::<i64>::try_from(&missing).unwrap();
        assert!(typed.is_missing(&-1));
        assert!(!typed.is_missing(&0));
    }

    #[test]
    fn test_try_from_missing_value() {
        let result = Missing::<i32>::try_from(&Missing::<DValue>::MissingValue(42.into())).unwrap();
        assert_eq!(Missing::<i32>::MissingValue(42), result);
    }

    #[test]
    fn test_try_from_missing_values() {
        let result = Missing::<i64>::try_from(&Missing::<DValue>::MissingValues(vec![
            42.into(),
            (-1).into(),
        ]))
        .unwrap();
        assert_eq!(Missing::<i64>::MissingValues(vec![42, -1]), result);
    }

    #[test]
    #[should_panic(expected = "IncompatibleMissing(Number(-1))")]
    fn test_try_from_missing_values_negative_unsigned() {
        Missing::<u64>::try_from(&Missing::<DValue>::MissingValues(vec![
            1.into(),
            (-1).into(),
        ]))
        .unwrap();
    }

    #[test]
    fn test_try_from_valid_range() {
        let result = Missing::<f32>::try_from(&Missing::<DValue>::ValidRange(
            DValue::from_f64(-42.0).unwrap(),
            DValue::from_f64(42.0).unwrap(),
        ))
        .unwrap();
        assert_eq!(Missing::<f32>::ValidRange(-42.0, 42.0), result);
    }

    #[test]
    fn test_validate_i32() {
        Missing::<DValue>::MissingValue(42.into())
            .validate(DType::Int32)
            .unwrap();
    }

    #[test]
    #[should_panic(expected = "Missing data descriptor is invalid")]
    fn test_validate_u32_negative() {
        Missing::<DValue>::ValidMin((-1).into())
            .validate(DType::Uint32)
            .unwrap();
    }

    #[test]
    #[should_panic(expected = "Missing data valid range min must be less than max")]
    fn test_validate_f64_range_min_eq_max() {
        Missing::<DValue>::ValidRange(
            DValue::from_f64(42.0).unwrap(),
            DValue::from_f64(42.0).unwrap(),
        )
        .validate(DType::Float64)
        .unwrap();
    }

    #[test]
    fn test_is_missing_value() {
        let missing = Missing::MissingValue(1.0e20_f32);
        assert!(!missing.is_missing(&0.0));
        assert!(missing.is_missing(&1.0e20));
    }

    #[test]
    fn test_is_missing_values() {
        let missing = Missing::MissingValues(vec![1, 2]);
        assert!(!missing.is_missing(&0));
        assert!(missing.is_missing(&1));
        assert!(missing.is_missing(&2));
        assert!(!missing.is_missing(&3));
    }

    #[test]
    fn test_is_missing_valid_min_max() {
        let missing = Missing::ValidMin(1);
        assert!(missing.is_missing(&0));
        assert!(!missing.is_missing(&1));
        let missing = Missing::ValidMax(1);
        assert!(!missing.is_missing(&1));
        assert!(missing.is_missing(&2));
    }

    #[test]
    fn test_is_missing_valid_range() {
        let missing = Missing::ValidRange(1, 2);
        assert!(missing.is_missing(&0));
        assert!(!missing.is_missing(&1));
        assert!(!missing.is_missing(&2));
        assert!(missing.is_missing(&3));
    }
}
