//! Functions and utilities for working with [ndarray] objects.

use crate::error::ActiveStorageError;
use crate::models::{ChunkDescriptor, DType, Extent};
use crate::operation::Element;

use bytes::Bytes;
use ndarray::prelude::*;
use std::borrow::Cow;

/// Call a generic function with the element type corresponding to a runtime [DType].
///
/// `with_dtype!(dtype, f, args...)` expands to `f::<T>(args...)` for the matching `T`.
#[macro_export]
macro_rules! with_dtype {
    ($dtype:expr, $f:ident, $($arg:expr),* $(,)?) => {
        match $dtype {
            $crate::models::DType::Int32 => $f::<i32>($($arg),*),
            $crate::models::DType::Int64 => $f::<i64>($($arg),*),
            $crate::models::DType::Uint32 => $f::<u32>($($arg),*),
            $crate::models::DType::Uint64 => $f::<u64>($($arg),*),
            $crate::models::DType::Float32 => $f::<f32>($($arg),*),
            $crate::models::DType::Float64 => $f::<f64>($($arg),*),
        }
    };
}

/// A C-ordered array of raw native-endian bytes, as read from a source.
#[derive(Clone, Debug, PartialEq)]
pub struct RawArray {
    /// Element data
    pub data: Bytes,
    /// Element type
    pub dtype: DType,
    /// Shape of the array
    pub shape: Vec<usize>,
}

impl RawArray {
    /// Return a new RawArray object.
    pub fn new(data: Bytes, dtype: DType, shape: Vec<usize>) -> Self {
        RawArray { data, dtype, shape }
    }

    /// Build a RawArray from typed elements.
    pub fn from_elements<T: Element>(dtype: DType, shape: Vec<usize>, data: &[T]) -> Self {
        let data = Bytes::copy_from_slice(zerocopy::AsBytes::as_bytes(data));
        RawArray { data, dtype, shape }
    }

    /// Number of elements described by the shape.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Convert from Bytes to `&[T]`.
///
/// Zerocopy provides a mechanism for converting between types. When the data is suitably
/// aligned it is borrowed, otherwise it is copied element by element.
///
/// # Arguments
///
/// * `data`: Bytes containing data to convert. Length must be a multiple of the size of `T`.
fn from_bytes<T: zerocopy::FromBytes + Clone>(
    data: &Bytes,
) -> Result<Cow<[T]>, ActiveStorageError> {
    let error = || ActiveStorageError::FromBytes {
        type_name: std::any::type_name::<T>(),
    };
    if let Some(layout) = zerocopy::LayoutVerified::<_, [T]>::new_slice(&data[..]) {
        return Ok(Cow::Borrowed(layout.into_slice()));
    }
    let size = std::mem::size_of::<T>();
    if size == 0 || data.len() % size != 0 {
        return Err(error());
    }
    data.chunks_exact(size)
        .map(|element| T::read_from(element).ok_or_else(error))
        .collect::<Result<Vec<T>, _>>()
        .map(Cow::Owned)
}

/// Build an [ndarray::CowArray](ndarray::CowArray) from a raw array.
///
/// The resulting array borrows the data of `raw` where alignment allows.
pub fn build_array<T: Element>(raw: &RawArray) -> Result<CowArray<T, IxDyn>, ActiveStorageError> {
    let shape = IxDyn(&raw.shape);
    match from_bytes::<T>(&raw.data)? {
        Cow::Borrowed(data) => Ok(ArrayView::from_shape(shape, data)?.into()),
        Cow::Owned(data) => Ok(Array::from_shape_vec(shape, data)?.into()),
    }
}

/// Check that a chunk lies within an array of the given shape.
pub fn check_bounds(shape: &[usize], chunk: &ChunkDescriptor) -> Result<(), ActiveStorageError> {
    if shape.is_empty() {
        return Err(ActiveStorageError::invalid_slice(
            "variable must have at least one dimension",
        ));
    }
    if chunk.extents.len() != shape.len() {
        return Err(ActiveStorageError::invalid_slice(format!(
            "chunk {} has {} dimensions, array has {}",
            chunk,
            chunk.extents.len(),
            shape.len()
        )));
    }
    for (extent, length) in std::iter::zip(&chunk.extents, shape) {
        if extent.start > extent.stop || extent.stop > *length {
            return Err(ActiveStorageError::invalid_slice(format!(
                "chunk {} out of bounds for shape {:?}",
                chunk, shape
            )));
        }
    }
    Ok(())
}

/// Returns an [ndarray] SliceInfo object selecting the extents.
pub fn build_slice_info(
    extents: &[Extent],
) -> Result<ndarray::SliceInfo<Vec<ndarray::SliceInfoElem>, IxDyn, IxDyn>, ActiveStorageError> {
    let si: Vec<ndarray::SliceInfoElem> = extents
        .iter()
        .map(|extent| ndarray::SliceInfoElem::Slice {
            start: extent.start as isize,
            end: Some(extent.stop as isize),
            step: 1,
        })
        .collect();
    Ok(ndarray::SliceInfo::try_from(si)?)
}

fn extract_typed<T: Element>(
    raw: &RawArray,
    chunk: &ChunkDescriptor,
) -> Result<RawArray, ActiveStorageError> {
    let array = build_array::<T>(raw)?;
    let slice_info = build_slice_info(&chunk.extents)?;
    let elements: Vec<T> = array.slice(slice_info).iter().copied().collect();
    Ok(RawArray::from_elements(raw.dtype, chunk.shape(), &elements))
}

/// Copy the elements of a chunk out of a whole array, in C order.
pub fn extract_chunk(
    raw: &RawArray,
    chunk: &ChunkDescriptor,
) -> Result<RawArray, ActiveStorageError> {
    check_bounds(&raw.shape, chunk)?;
    with_dtype!(raw.dtype, extract_typed, raw, chunk)
}

fn build_mask_typed<T: Element>(raw: &RawArray) -> Result<ArrayD<bool>, ActiveStorageError> {
    Ok(build_array::<T>(raw)?.mapv(|x| !x.is_zero()))
}

/// Convert a numeric mask array to booleans. Nonzero elements are true, and exclude data.
pub fn build_mask(raw: &RawArray) -> Result<ArrayD<bool>, ActiveStorageError> {
    with_dtype!(raw.dtype, build_mask_typed, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_u32() {
        assert_eq!(
            [0x04030201_u32],
            from_bytes::<u32>(&Bytes::from_static(&[1, 2, 3, 4])).unwrap().as_ref()
        );
    }

    #[test]
    fn from_bytes_i64() {
        assert_eq!(
            [0x0807060504030201_i64],
            from_bytes::<i64>(&Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]))
                .unwrap()
                .as_ref()
        );
    }

    #[test]
    fn from_bytes_f32() {
        assert_eq!(
            [1.5399896e-36_f32],
            from_bytes::<f32>(&Bytes::from_static(&[1, 2, 3, 4])).unwrap().as_ref()
        );
    }

    #[test]
    fn from_bytes_f64() {
        assert_eq!(
            [5.447603722011605e-270_f64],
            from_bytes::<f64>(&Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]))
                .unwrap()
                .as_ref()
        );
    }

    fn assert_from_bytes_error<T: std::fmt::Debug>(result: Result<T, ActiveStorageError>) {
        match result.unwrap_err() {
            ActiveStorageError::FromBytes { type_name: _ } => (),
            _ => panic!("expected from_bytes to fail"),
        };
    }

    #[test]
    fn from_bytes_u32_too_small() {
        assert_from_bytes_error(from_bytes::<u32>(&Bytes::from_static(&[1, 2, 3])))
    }

    #[test]
    fn from_bytes_u32_too_big() {
        assert_from_bytes_error(from_bytes::<u32>(&Bytes::from_static(&[1, 2, 3, 4, 5])))
    }

    #[test]
    fn from_bytes_u32_unaligned_is_copied() {
        static ARRAY: [u32; 3] = [0, 0x04030201, 0x08070605];
        let bytes = Bytes::from_static(zerocopy::AsBytes::as_bytes(&ARRAY[..]));
        // Skip one byte at each end to force misalignment.
        let unaligned = bytes.slice(1..9);
        let result = from_bytes::<u32>(&unaligned).unwrap();
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(2, result.len());
    }

    #[test]
    fn build_array_2d_i64() {
        let raw = RawArray::from_elements(DType::Int64, vec![2, 1], &[7_i64, -3]);
        let array = build_array::<i64>(&raw).unwrap();
        assert_eq!(array![[7_i64], [-3]].into_dyn(), array);
    }

    #[test]
    fn build_array_shape_mismatch() {
        let raw = RawArray::from_elements(DType::Int32, vec![4], &[1_i32, 2, 3]);
        match build_array::<i32>(&raw).unwrap_err() {
            ActiveStorageError::ShapeInvalid(err) => {
                assert_eq!(ndarray::ErrorKind::OutOfBounds, err.kind())
            }
            _ => panic!("Expected out of bounds error"),
        }
    }

    #[test]
    fn build_slice_info_2d() {
        let slice_info = build_slice_info(&[Extent::new(0, 1), Extent::new(2, 4)]).unwrap();
        assert_eq!(
            [
                ndarray::SliceInfoElem::Slice {
                    start: 0,
                    end: Some(1),
                    step: 1
                },
                ndarray::SliceInfoElem::Slice {
                    start: 2,
                    end: Some(4),
                    step: 1
                }
            ],
            slice_info.as_ref()
        );
    }

    #[test]
    fn extract_chunk_2d() {
        let data: Vec<u32> = (0..12).collect();
        let raw = RawArray::from_elements(DType::Uint32, vec![3, 4], &data);
        let chunk = ChunkDescriptor::new(vec![Extent::new(1, 3), Extent::new(1, 3)]);
        let extracted = extract_chunk(&raw, &chunk).unwrap();
        assert_eq!(vec![2, 2], extracted.shape);
        let array = build_array::<u32>(&extracted).unwrap();
        assert_eq!(array![[5_u32, 6], [9, 10]].into_dyn(), array);
    }

    #[test]
    fn extract_chunk_empty() {
        let raw = RawArray::from_elements(DType::Float32, vec![4], &[1.0_f32, 2.0, 3.0, 4.0]);
        let chunk = ChunkDescriptor::new(vec![Extent::new(2, 2)]);
        let extracted = extract_chunk(&raw, &chunk).unwrap();
        assert_eq!(0, extracted.size());
        assert!(extracted.data.is_empty());
    }

    #[test]
    fn extract_chunk_out_of_bounds() {
        let raw = RawArray::from_elements(DType::Float32, vec![4], &[1.0_f32, 2.0, 3.0, 4.0]);
        let chunk = ChunkDescriptor::new(vec![Extent::new(2, 5)]);
        match extract_chunk(&raw, &chunk).unwrap_err() {
            ActiveStorageError::InvalidSlice { reason } => {
                assert_eq!("chunk [2:5] out of bounds for shape [4]", reason)
            }
            error => panic!("unexpected error {error:?}"),
        }
    }

    #[test]
    fn check_bounds_wrong_ndim() {
        let chunk = ChunkDescriptor::new(vec![Extent::new(0, 1)]);
        assert!(check_bounds(&[2, 2], &chunk).is_err());
    }

    #[test]
    fn check_bounds_zero_dimensions() {
        let error = check_bounds(&[], &ChunkDescriptor::new(vec![])).unwrap_err();
        assert_eq!(
            "invalid selection: variable must have at least one dimension",
            error.to_string()
        );
    }

    #[test]
    fn build_mask_nonzero_is_true() {
        let raw = RawArray::from_elements(DType::Float64, vec![4], &[0.0_f64, 1.0, -2.5, 0.0]);
        let mask = build_mask(&raw).unwrap();
        assert_eq!(array![false, true, true, false].into_dyn(), mask);
    }
}
