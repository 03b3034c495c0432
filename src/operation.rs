use crate::error::ActiveStorageError;
use crate::operations;
use crate::types::{IntoScalar, Missing, Scalar, TryFromDValue};

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Trait for array elements.
pub trait Element:
    Clone
    + Copy
    + PartialOrd
    + Send
    + Sync
    + 'static
    + IntoScalar
    + TryFromDValue
    + num_traits::Zero
    + std::fmt::Debug
    + zerocopy::AsBytes
    + zerocopy::FromBytes
{
}

/// Blanket implementation of Element.
impl<T> Element for T where
    T: Clone
        + Copy
        + PartialOrd
        + Send
        + Sync
        + 'static
        + IntoScalar
        + TryFromDValue
        + num_traits::Zero
        + std::fmt::Debug
        + zerocopy::AsBytes
        + zerocopy::FromBytes
{
}

/// Partially reduced data.
///
/// Every operation carries the number of unmasked, non-missing elements that contributed to the
/// partial. `value` is the running maximum, minimum or sum, and is `None` when no elements
/// contributed or for count, which needs only the element count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PartialResult {
    /// Reduced value
    pub value: Option<Scalar>,
    /// Number of elements reduced
    pub count: u64,
}

impl PartialResult {
    /// Return a PartialResult object.
    pub fn new(value: Option<Scalar>, count: u64) -> Self {
        PartialResult { value, count }
    }
}

/// Trait for active storage operations.
///
/// This forms the contract between the dispatcher and the operations. `combine` must be
/// associative and commutative, so that neither chunk order nor chunk size affects the result.
pub trait Operation {
    /// Name of the operation.
    const NAME: &'static str;

    /// Reduce the elements of `array` that are neither masked nor missing.
    ///
    /// # Arguments
    ///
    /// * `array`: Data to reduce
    /// * `mask`: Optional mask of the same shape as `array`. True elements are excluded.
    /// * `missing`: Optional missing data descriptor. Missing elements are excluded.
    fn apply<T: Element>(
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError>;

    /// Combine two partial results.
    fn combine(a: PartialResult, b: PartialResult) -> PartialResult;

    /// Convert a fully combined partial result into the final value.
    fn finalize(partial: PartialResult) -> Result<Scalar, ActiveStorageError>;
}

/// The supported reductions.
///
/// This provides an entry point into the operations based on a runtime value, in the same way
/// that [DType](crate::models::DType) provides one into the element types.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Reduction {
    Count,
    Max,
    Mean,
    Min,
    Sum,
}

impl Reduction {
    /// Name of the reduction.
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => operations::Count::NAME,
            Self::Max => operations::Max::NAME,
            Self::Mean => operations::Mean::NAME,
            Self::Min => operations::Min::NAME,
            Self::Sum => operations::Sum::NAME,
        }
    }

    /// Apply the reduction to a chunk of data. See [Operation::apply].
    pub fn apply<T: Element>(
        self,
        array: ArrayViewD<T>,
        mask: Option<ArrayViewD<bool>>,
        missing: Option<&Missing<T>>,
    ) -> Result<PartialResult, ActiveStorageError> {
        match self {
            Self::Count => operations::Count::apply(array, mask, missing),
            Self::Max => operations::Max::apply(array, mask, missing),
            Self::Mean => operations::Mean::apply(array, mask, missing),
            Self::Min => operations::Min::apply(array, mask, missing),
            Self::Sum => operations::Sum::apply(array, mask, missing),
        }
    }

    /// Combine two partial results. See [Operation::combine].
    pub fn combine(self, a: PartialResult, b: PartialResult) -> PartialResult {
        match self {
            Self::Count => operations::Count::combine(a, b),
            Self::Max => operations::Max::combine(a, b),
            Self::Mean => operations::Mean::combine(a, b),
            Self::Min => operations::Min::combine(a, b),
            Self::Sum => operations::Sum::combine(a, b),
        }
    }

    /// Finalise a combined partial result. See [Operation::finalize].
    pub fn finalize(self, partial: PartialResult) -> Result<Scalar, ActiveStorageError> {
        match self {
            Self::Count => operations::Count::finalize(partial),
            Self::Max => operations::Max::finalize(partial),
            Self::Mean => operations::Mean::finalize(partial),
            Self::Min => operations::Min::finalize(partial),
            Self::Sum => operations::Sum::finalize(partial),
        }
    }

    /// Result of the reduction over a selection containing no elements.
    ///
    /// Only count has a meaningful result; the other reductions fail.
    pub fn empty_range(self) -> Result<Scalar, ActiveStorageError> {
        match self {
            Self::Count => Ok(Scalar::Uint(0)),
            _ => Err(ActiveStorageError::EmptyRange {
                operation: self.name(),
            }),
        }
    }
}
