//! Numerical operations.
//!
//! Each operation is implemented as a struct that implements the
//! [Operation](crate::operation::Operation) trait.

use crate::error::ActiveStorageError;
use crate::operation::{Element, Operation, PartialResult};
use crate::types::{Missing, Scalar};

use ndarray::{ArrayViewD, Zip};

/// Fold over the elements of `array` that are neither masked nor missing.
///
/// Returns the accumulator and the number of elements folded.
///
/// # Arguments
///
/// * `array`: Data to fold over
/// * `mask`: Optional mask. Must have the same shape as `array`.
/// * `missing`: Optional missing data descriptor
/// * `init`: Initial accumulator
/// * `f`: Folding function
fn fold_unmasked<T: Element, A>(
    array: ArrayViewD<T>,
    mask: Option<ArrayViewD<bool>>,
    missing: Option<&Missing<T>>,
    init: A,
    mut f: impl FnMut(A, T) -> A,
) -> Result<(A, u64), ActiveStorageError> {
    let is_missing = |x: &T| missing.map_or(false, |missing| missing.is_missing(x));
    let result = match mask {
        Some(mask) => {
            if mask.shape() != array.shape() {
                return Err(ActiveStorageError::MaskAlignment {
                    mask: mask.shape().to_vec(),
                    data: array.shape().to_vec(),
                });
            }
            Zip::from(&array)
                .and(&mask)
                .fold((init, 0), |(acc, count), x, masked| {
                    if *masked || is_missing(x) {
                        (acc, count)
                    } else {
                        (f(acc, *x), count + 1)
                    }
                })
        }
        None => array.iter().fold((init, 0), |(acc, count), x| {
            if is_missing(x) {
                (acc, count)
            } else {
                (f(acc, *x), count + 1)
            }
        }),
    };
    Ok(result)
}

/// Combine two optional values, keeping whichever is present if only one is.
fn merge(a: Option<Scalar>, b: Option<Scalar>, f: fn(Scalar, Scalar) -> Scalar) -> Option<Scalar> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Fold function accumulating an optional value from elements.
fn accumulate<T: Element>(
    f: fn(Scalar, Scalar) -> Scalar,
) -> impl Fn(Option<Scalar>, T) -> Option<Scalar> {
    move |acc, x| {
        let x = x.into_scalar();
        Some(acc.map_or(x, |acc| f(acc, x)))
    }
}

/// Returns the value of a partial, or an error if no elements contributed to it.
fn require_value(
    partial: PartialResult,
    operation: &'static str,
) -> Result<Scalar, ActiveStorageError> {
    match partial.value {
        Some(value) if partial.count > 0 => Ok(value),
        _ => Err(ActiveStorageError::EmptyChunk { operation }),
    }
}

/// Return the number of unmasked elements.
pub struct Count {}

impl Operation for Count {
    const NAME: &'static str = "count";

    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        let ((), count) = fold_unmasked(array, mask, missing, (), |(), _| ())?;
        Ok(PartialResult::new(None, count))
    }

    fn combine(a: PartialResult, b: PartialResult) -> PartialResult {
        PartialResult::new(None, a.count + b.count)
    }

    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        Ok(Scalar::Uint(partial.count))
    }
}

/// Return the maximum of unmasked elements.
pub struct Max {}

impl Operation for Max {
    const NAME: &'static str = "max";

    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        let (max, count) = fold_unmasked(array, mask, missing, None, accumulate(Scalar::max))?;
        Ok(PartialResult::new(max, count))
    }

    fn combine(a: PartialResult, b: PartialResult) -> PartialResult {
        PartialResult::new(merge(a.value, b.value, Scalar::max), a.count + b.count)
    }

    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        require_value(partial, Self::NAME)
    }
}

/// Return the mean of unmasked elements.
///
/// Partials carry the sum and count, so that the mean of unequally sized chunks is correct.
pub struct Mean {}

impl Operation for Mean {
    const NAME: &'static str = "mean";

    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        Sum::apply(array, mask, missing)
    }

    fn combine(a: PartialResult, b: PartialResult) -> PartialResult {
        Sum::combine(a, b)
    }

    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        match partial.value {
            Some(sum) if partial.count > 0 => {
                Ok(Scalar::Float(sum.as_f64() / partial.count as f64))
            }
            _ => Err(ActiveStorageError::DivisionByZero {
                operation: Self::NAME,
            }),
        }
    }
}

/// Return the minimum of unmasked elements.
pub struct Min {}

impl Operation for Min {
    const NAME: &'static str = "min";

    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        let (min, count) = fold_unmasked(array, mask, missing, None, accumulate(Scalar::min))?;
        Ok(PartialResult::new(min, count))
    }

    fn combine(a: PartialResult, b: PartialResult) -> PartialResult {
        PartialResult::new(merge(a.value, b.value, Scalar::min), a.count + b.count)
    }

    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        require_value(partial, Self::NAME)
    }
}

/// Return the sum of unmasked elements.
pub struct Sum {}

impl Operation for Sum {
    const NAME: &'static str = "sum";

    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        let (sum, count) = fold_unmasked(array, mask, missing, None, accumulate(|a, b| a + b))?;
        Ok(PartialResult::new(sum, count))
    }

    fn combine(a: PartialResult, b: PartialResult) -> PartialResult {
        PartialResult::new(merge(a.value, b.value, |a, b| a + b), a.count + b.count)
    }

    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        require_value(partial, Self::NAME)
    }
}
