//! Partitioning of a selection into chunks.

use crate::error::ActiveStorageError;
use crate::models::{ChunkDescriptor, ChunkHint, Extent, Selection};

/// An ordered set of disjoint chunks that together cover a selection.
///
/// Chunks are formed from the cartesian product of per-dimension partitions, and are visited in
/// row-major order (first dimension slowest). A plan may be iterated any number of times.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkPlan {
    /// The selected extents, one per dimension
    selection: Vec<Extent>,
    /// Partition of each selected extent
    partitions: Vec<Vec<Extent>>,
}

impl ChunkPlan {
    /// The selected extents, one per dimension.
    pub fn selection(&self) -> &[Extent] {
        &self.selection
    }

    /// Number of elements selected.
    pub fn size(&self) -> usize {
        self.selection.iter().map(Extent::len).product()
    }

    /// Number of chunks in the plan.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).product()
    }

    /// Whether the plan contains no chunks. This is the case only for empty selections.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the chunks of the plan.
    pub fn iter(&self) -> ChunkPlanIter<'_> {
        ChunkPlanIter {
            plan: self,
            index: vec![0; self.partitions.len()],
            done: self.is_empty(),
        }
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = ChunkDescriptor;
    type IntoIter = ChunkPlanIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Row-major iterator over the chunks of a [ChunkPlan].
#[derive(Debug)]
pub struct ChunkPlanIter<'a> {
    plan: &'a ChunkPlan,
    /// Index into each dimension's partition of the next chunk
    index: Vec<usize>,
    done: bool,
}

impl<'a> Iterator for ChunkPlanIter<'a> {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let extents = std::iter::zip(&self.index, &self.plan.partitions)
            .map(|(i, partition)| partition[*i])
            .collect();
        // Advance the last dimension fastest, carrying into earlier dimensions.
        self.done = true;
        for (i, partition) in self.index.iter_mut().zip(&self.plan.partitions).rev() {
            *i += 1;
            if *i < partition.len() {
                self.done = false;
                break;
            }
            *i = 0;
        }
        Some(ChunkDescriptor::new(extents))
    }
}

/// Split an extent into consecutive parts of at most `size` indices.
fn partition_by_size(extent: Extent, size: usize) -> Vec<Extent> {
    (extent.start..extent.stop)
        .step_by(size)
        .map(|start| Extent::new(start, std::cmp::min(start + size, extent.stop)))
        .collect()
}

/// Split an extent into `parts` consecutive near-equal parts.
///
/// The first `len % parts` parts are one index longer than the rest. Parts that would be empty
/// are omitted.
fn partition_into(extent: Extent, parts: usize) -> Vec<Extent> {
    let (base, remainder) = (extent.len() / parts, extent.len() % parts);
    let mut start = extent.start;
    (0..parts)
        .map(|part| {
            let len = base + usize::from(part < remainder);
            let part = Extent::new(start, start + len);
            start += len;
            part
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Resolve a selection against a shape, validating it.
fn resolve_selection(
    shape: &[usize],
    selection: &Selection,
) -> Result<Vec<Extent>, ActiveStorageError> {
    match selection {
        Selection::All => Ok(shape.iter().map(|length| Extent::new(0, *length)).collect()),
        Selection::Extents(extents) => {
            if extents.len() != shape.len() {
                return Err(ActiveStorageError::invalid_slice(format!(
                    "selection has {} dimensions, variable has {}",
                    extents.len(),
                    shape.len()
                )));
            }
            for (dim, (extent, length)) in std::iter::zip(extents, shape).enumerate() {
                if extent.stop < extent.start {
                    return Err(ActiveStorageError::invalid_slice(format!(
                        "stop before start in dimension {dim}: {extent}"
                    )));
                }
                if extent.stop > *length {
                    return Err(ActiveStorageError::invalid_slice(format!(
                        "extent {extent} out of bounds for dimension {dim} of length {length}"
                    )));
                }
            }
            Ok(extents.clone())
        }
    }
}

/// Plan the chunks covering a selection of an array.
///
/// # Arguments
///
/// * `shape`: Shape of the variable
/// * `selection`: The part of the variable to cover
/// * `hint`: How to partition the selection
pub fn plan(
    shape: &[usize],
    selection: &Selection,
    hint: &ChunkHint,
) -> Result<ChunkPlan, ActiveStorageError> {
    if shape.is_empty() {
        return Err(ActiveStorageError::invalid_slice(
            "variable must have at least one dimension",
        ));
    }
    let selection = resolve_selection(shape, selection)?;
    let partitions = match hint {
        ChunkHint::Whole => selection.iter().map(|extent| vec![*extent]).collect(),
        ChunkHint::Shape(chunk_shape) => {
            if chunk_shape.len() != selection.len() {
                return Err(ActiveStorageError::invalid_slice(format!(
                    "chunk shape {:?} does not have {} dimensions",
                    chunk_shape,
                    selection.len()
                )));
            }
            if chunk_shape.contains(&0) {
                return Err(ActiveStorageError::invalid_slice(format!(
                    "chunk shape {chunk_shape:?} contains a zero size"
                )));
            }
            std::iter::zip(&selection, chunk_shape)
                .map(|(extent, size)| partition_by_size(*extent, *size))
                .collect()
        }
        ChunkHint::Split(parts) => {
            if *parts == 0 {
                return Err(ActiveStorageError::invalid_slice(
                    "cannot split selection into zero parts",
                ));
            }
            let mut partitions = vec![partition_into(selection[0], *parts)];
            partitions.extend(selection[1..].iter().map(|extent| vec![*extent]));
            partitions
        }
    };
    // An empty dimension means an empty selection, and therefore no chunks.
    let partitions = if selection.iter().any(Extent::is_empty) {
        vec![vec![]; selection.len()]
    } else {
        partitions
    };
    Ok(ChunkPlan {
        selection,
        partitions,
    })
}
