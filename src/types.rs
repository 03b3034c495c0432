pub mod byte_order;
pub mod missing;
pub mod value;

// Re-export types for convenience.
pub use crate::types::byte_order::ByteOrder;
pub use crate::types::missing::Missing;
pub use crate::types::value::{DValue, IntoScalar, Scalar, TryFromDValue};
