use crate::array::RawArray;
use crate::models::*;
use crate::source::memory::MemorySource;

use std::sync::Arc;

/// Create a VariableRef for the `tas` test variable.
pub(crate) fn get_test_variable() -> VariableRef {
    VariableRef::new("/data", "tas", DType::Float32, vec![12])
}

/// Create a MaskSpec for the `fx/land` mask, which masks every third element of `tas`.
pub(crate) fn get_test_mask_spec() -> MaskSpec {
    MaskSpec::Internal {
        variable: "land".to_string(),
        group: vec!["fx".to_string()],
    }
}

/// Create a MemorySource containing test datasets.
///
/// * `/data`:
///   * `tas`: float32 [12], 0 to 11
///   * `fx/land`: uint32 [12], nonzero at every third element
///   * `grid`: int64 [3, 4], 0 to 11
/// * `/masks`:
///   * `head`: int32 [12], nonzero in the first four elements
///   * `all`: uint64 [12], nonzero everywhere
pub(crate) fn get_test_source() -> Arc<MemorySource> {
    let tas: Vec<f32> = (0..12).map(|x| x as f32).collect();
    let land: Vec<u32> = (0..12).map(|x| u32::from(x % 3 == 0)).collect();
    let grid: Vec<i64> = (0..12).collect();
    let head: Vec<i32> = (0..12).map(|x| i32::from(x < 4)).collect();
    let source = MemorySource::new()
        .with_variable(
            "/data",
            "tas",
            RawArray::from_elements(DType::Float32, vec![12], &tas),
        )
        .with_variable(
            "/data",
            "fx/land",
            RawArray::from_elements(DType::Uint32, vec![12], &land),
        )
        .with_variable(
            "/data",
            "grid",
            RawArray::from_elements(DType::Int64, vec![3, 4], &grid),
        )
        .with_variable(
            "/masks",
            "head",
            RawArray::from_elements(DType::Int32, vec![12], &head),
        )
        .with_variable(
            "/masks",
            "all",
            RawArray::from_elements(DType::Uint64, vec![12], &[7_u64; 12]),
        );
    Arc::new(source)
}
