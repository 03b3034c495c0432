//! Lookup of reductions by name.

use crate::error::ActiveStorageError;
use crate::operation::Reduction;

/// Every supported reduction.
pub const REDUCTIONS: [Reduction; 5] = [
    Reduction::Count,
    Reduction::Max,
    Reduction::Mean,
    Reduction::Min,
    Reduction::Sum,
];

/// Returns the reduction with the given name.
///
/// Names are matched exactly, e.g. `max`, not `MAX`.
pub fn lookup(name: &str) -> Result<Reduction, ActiveStorageError> {
    REDUCTIONS
        .iter()
        .copied()
        .find(|reduction| reduction.name() == name)
        .ok_or_else(|| ActiveStorageError::UnsupportedOperation {
            operation: name.to_string(),
        })
}

/// Returns the names of all supported reductions.
pub fn supported() -> impl Iterator<Item = &'static str> {
    REDUCTIONS.iter().map(|reduction| reduction.name())
}
