//! Execution of chunk reductions.
//!
//! A [ChunkExecutor] turns one [ChunkTask] into a [PartialResult]. The [LocalExecutor] reads
//! the whole chunk and reduces it here, while the [ActiveExecutor] asks an
//! [ActiveStorage](crate::active::ActiveStorage) backend to reduce it where the data lives.

use crate::active::{ActiveStorage, ReductionRequest};
use crate::array::{self, RawArray};
use crate::error::ActiveStorageError;
use crate::mask::MaskResolver;
use crate::models::{ChunkDescriptor, MaskSpec, Mode, VariableRef};
use crate::operation::{Element, PartialResult, Reduction};
use crate::resource_manager::ResourceManager;
use crate::source::{self, Source};
use crate::types::{DValue, Missing};
use crate::with_dtype;

use async_trait::async_trait;
use ndarray::ArrayD;
use std::sync::Arc;

/// One unit of work: reduce one chunk of a variable.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkTask {
    /// The variable to reduce
    pub variable: Arc<VariableRef>,
    /// The chunk of the variable to reduce
    pub chunk: ChunkDescriptor,
    /// The reduction to apply
    pub reduction: Reduction,
    /// Where to find the mask for the variable
    pub mask: Arc<MaskSpec>,
}

/// Computes the partial result of a chunk task.
#[async_trait]
pub trait ChunkExecutor: Send + Sync + std::fmt::Debug {
    /// Where this executor computes reductions.
    fn mode(&self) -> Mode;

    /// Returns the partial result of one chunk.
    async fn execute(&self, task: &ChunkTask) -> Result<PartialResult, ActiveStorageError>;
}

fn reduce_typed<T: Element>(
    reduction: Reduction,
    raw: &RawArray,
    mask: Option<&ArrayD<bool>>,
    missing: Option<&Missing<DValue>>,
) -> Result<PartialResult, ActiveStorageError> {
    let missing = missing.map(Missing::<T>::try_from).transpose()?;
    let array = array::build_array::<T>(raw)?;
    reduction.apply(array.view(), mask.map(|mask| mask.view()), missing.as_ref())
}

/// Apply a reduction to a chunk of raw data.
///
/// # Arguments
///
/// * `reduction`: The reduction to apply
/// * `raw`: Chunk data
/// * `mask`: Optional mask of the same shape as the chunk
/// * `missing`: Optional missing data descriptor of the variable
/// * `use_rayon`: Whether to run the reduction on the Rayon thread pool
pub async fn reduce_chunk(
    reduction: Reduction,
    raw: RawArray,
    mask: Option<ArrayD<bool>>,
    missing: Option<Missing<DValue>>,
    use_rayon: bool,
) -> Result<PartialResult, ActiveStorageError> {
    let reduce = move || {
        with_dtype!(
            raw.dtype,
            reduce_typed,
            reduction,
            &raw,
            mask.as_ref(),
            missing.as_ref()
        )
    };
    if use_rayon {
        tokio_rayon::spawn(reduce).await
    } else {
        reduce()
    }
}

/// Read, mask and reduce one chunk of a variable.
///
/// Data that cannot be interpreted as the variable's dtype and chunk shape is reported as a
/// [SourceRead](ActiveStorageError::SourceRead) error.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(
    level = "debug",
    skip(source, masks, resource_manager, variable, mask),
    fields(variable = %variable.path(), chunk = %chunk)
)]
pub(crate) async fn read_and_reduce(
    source: &dyn Source,
    masks: &MaskResolver,
    resource_manager: &ResourceManager,
    use_rayon: bool,
    variable: &VariableRef,
    chunk: &ChunkDescriptor,
    reduction: Reduction,
    mask: &MaskSpec,
) -> Result<PartialResult, ActiveStorageError> {
    let malformed = |cause: String| {
        ActiveStorageError::source_read(&variable.identifier, &variable.path(), cause)
    };
    let _memory_permit = resource_manager.chunk_memory(chunk, variable.dtype).await?;
    let raw = source::read_chunk(
        source,
        resource_manager,
        &variable.identifier,
        &variable.variable,
        &variable.group,
        chunk,
    )
    .await?;
    if raw.dtype != variable.dtype {
        return Err(malformed(format!(
            "expected dtype {}, found {}",
            variable.dtype, raw.dtype
        )));
    }
    if raw.shape != chunk.shape() {
        return Err(malformed(format!(
            "expected shape {:?}, found {:?}",
            chunk.shape(),
            raw.shape
        )));
    }
    let mask = masks.resolve(mask, variable, chunk).await?;
    reduce_chunk(reduction, raw, mask, variable.missing.clone(), use_rayon)
        .await
        .map_err(|err| match err {
            ActiveStorageError::FromBytes { type_name: _ }
            | ActiveStorageError::ShapeInvalid(_) => {
                ActiveStorageError::source_read(&variable.identifier, &variable.path(), err)
            }
            err => err,
        })
}

/// Reads whole chunks from a source and reduces them locally.
#[derive(Clone, Debug)]
pub struct LocalExecutor {
    source: Arc<dyn Source>,
    masks: MaskResolver,
    resource_manager: Arc<ResourceManager>,
    use_rayon: bool,
}

impl LocalExecutor {
    /// Returns a new LocalExecutor object.
    ///
    /// # Arguments
    ///
    /// * `source`: Source of variable and internal mask data
    /// * `masks`: Resolves masks for chunks
    /// * `resource_manager`: Limits open handles and memory
    /// * `use_rayon`: Whether to run reductions on the Rayon thread pool
    pub fn new(
        source: Arc<dyn Source>,
        masks: MaskResolver,
        resource_manager: Arc<ResourceManager>,
        use_rayon: bool,
    ) -> Self {
        LocalExecutor {
            source,
            masks,
            resource_manager,
            use_rayon,
        }
    }
}

#[async_trait]
impl ChunkExecutor for LocalExecutor {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    async fn execute(&self, task: &ChunkTask) -> Result<PartialResult, ActiveStorageError> {
        read_and_reduce(
            self.source.as_ref(),
            &self.masks,
            &self.resource_manager,
            self.use_rayon,
            &task.variable,
            &task.chunk,
            task.reduction,
            &task.mask,
        )
        .await
    }
}

/// Delegates chunk reductions to an active storage backend, receiving only partial results.
#[derive(Clone, Debug)]
pub struct ActiveExecutor {
    active: Arc<dyn ActiveStorage>,
}

impl ActiveExecutor {
    /// Returns a new ActiveExecutor object.
    pub fn new(active: Arc<dyn ActiveStorage>) -> Self {
        ActiveExecutor { active }
    }
}

#[async_trait]
impl ChunkExecutor for ActiveExecutor {
    fn mode(&self) -> Mode {
        Mode::Active
    }

    async fn execute(&self, task: &ChunkTask) -> Result<PartialResult, ActiveStorageError> {
        self.active.submit(&ReductionRequest::from(task)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::active::EmulatedActiveStorage;
    use crate::error::ErrorKind;
    use crate::models::{DType, Extent};
    use crate::source::memory::MemorySource;
    use crate::test_utils;
    use crate::types::Scalar;

    fn get_test_task(reduction: Reduction, start: usize, stop: usize) -> ChunkTask {
        ChunkTask {
            variable: Arc::new(test_utils::get_test_variable()),
            chunk: ChunkDescriptor::new(vec![Extent::new(start, stop)]),
            reduction,
            mask: Arc::new(MaskSpec::None),
        }
    }

    fn get_test_executor(source: Arc<MemorySource>, use_rayon: bool) -> LocalExecutor {
        let resource_manager = Arc::new(ResourceManager::default());
        let masks = MaskResolver::new(source.clone(), resource_manager.clone());
        LocalExecutor::new(source, masks, resource_manager, use_rayon)
    }

    #[tokio::test]
    async fn local_max() {
        let executor = get_test_executor(test_utils::get_test_source(), false);
        let partial = executor
            .execute(&get_test_task(Reduction::Max, 0, 4))
            .await
            .unwrap();
        assert_eq!(PartialResult::new(Some(Scalar::Float(3.0)), 4), partial);
        assert_eq!(Mode::Local, executor.mode());
    }

    #[tokio::test]
    async fn local_sum_rayon() {
        let executor = get_test_executor(test_utils::get_test_source(), true);
        let partial = executor
            .execute(&get_test_task(Reduction::Sum, 4, 8))
            .await
            .unwrap();
        assert_eq!(PartialResult::new(Some(Scalar::Float(22.0)), 4), partial);
    }

    #[tokio::test]
    async fn local_internal_mask() {
        let executor = get_test_executor(test_utils::get_test_source(), false);
        let mut task = get_test_task(Reduction::Count, 0, 12);
        task.mask = Arc::new(test_utils::get_test_mask_spec());
        let partial = executor.execute(&task).await.unwrap();
        // Every third element is masked.
        assert_eq!(8, partial.count);
    }

    #[tokio::test]
    async fn local_missing_value() {
        let executor = get_test_executor(test_utils::get_test_source(), false);
        let mut task = get_test_task(Reduction::Min, 0, 12);
        let variable = test_utils::get_test_variable().with_missing(Missing::ValidMin(5.into()));
        task.variable = Arc::new(variable);
        let partial = executor.execute(&task).await.unwrap();
        assert_eq!(PartialResult::new(Some(Scalar::Float(5.0)), 7), partial);
    }

    #[tokio::test]
    async fn local_dtype_mismatch() {
        let source = test_utils::get_test_source();
        let executor = get_test_executor(source.clone(), false);
        let mut task = get_test_task(Reduction::Max, 0, 4);
        task.variable = Arc::new(VariableRef::new("/data", "tas", DType::Int64, vec![12]));
        let error = executor.execute(&task).await.unwrap_err();
        assert_eq!(ErrorKind::SourceRead, error.kind());
        assert_eq!(vec!["expected dtype int64, found float32"], error.caused_by());
        assert_eq!(0, source.open_handles());
    }

    #[tokio::test]
    async fn local_insufficient_memory() {
        let source = test_utils::get_test_source();
        let resource_manager = Arc::new(ResourceManager::new(None, Some(8), None));
        let masks = MaskResolver::new(source.clone(), resource_manager.clone());
        let executor = LocalExecutor::new(source.clone(), masks, resource_manager, false);
        let error = executor
            .execute(&get_test_task(Reduction::Max, 0, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ActiveStorageError::InsufficientMemory {
                requested: 16,
                total: 8
            }
        ));
        assert_eq!(0, source.total_opens());
    }

    #[tokio::test]
    async fn local_malformed_data() {
        // Five bytes cannot hold a whole number of float32 elements.
        let raw = RawArray::new(bytes::Bytes::from_static(&[0; 5]), DType::Float32, vec![1]);
        let error = reduce_chunk(Reduction::Max, raw, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(error, ActiveStorageError::FromBytes { .. }));
    }

    #[tokio::test]
    async fn active_matches_local() {
        let source = test_utils::get_test_source();
        let local = get_test_executor(source.clone(), false);
        let active = ActiveExecutor::new(Arc::new(EmulatedActiveStorage::new(
            source,
            Arc::new(ResourceManager::default()),
            false,
        )));
        assert_eq!(Mode::Active, active.mode());
        for reduction in crate::registry::REDUCTIONS {
            let mut task = get_test_task(reduction, 2, 11);
            task.mask = Arc::new(test_utils::get_test_mask_spec());
            assert_eq!(
                local.execute(&task).await.unwrap(),
                active.execute(&task).await.unwrap()
            );
        }
    }
}
