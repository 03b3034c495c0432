//! Active storage: reductions performed where the data lives.

use crate::error::ActiveStorageError;
use crate::executor::{read_and_reduce, ChunkTask};
use crate::mask::MaskResolver;
use crate::models::{ChunkDescriptor, DType, MaskSpec, VariableRef};
use crate::operation::{PartialResult, Reduction};
use crate::resource_manager::ResourceManager;
use crate::source::Source;
use crate::types::{DValue, Missing};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// A request to reduce one chunk of a variable within the storage.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReductionRequest {
    /// Identifier of the dataset containing the variable
    pub identifier: String,
    /// Variable name
    pub variable: String,
    /// Path of groups containing the variable
    #[serde(default)]
    pub group: Vec<String>,
    /// Element type
    pub dtype: DType,
    /// Shape of the whole variable
    pub shape: Vec<usize>,
    /// The chunk to reduce
    pub chunk: ChunkDescriptor,
    /// The reduction to apply
    pub operation: Reduction,
    /// Where to find the mask for the variable
    #[serde(default)]
    pub mask: MaskSpec,
    /// Missing data described by the variable's attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing<DValue>>,
}

impl ReductionRequest {
    /// The variable described by the request.
    pub fn variable_ref(&self) -> VariableRef {
        VariableRef {
            identifier: self.identifier.clone(),
            variable: self.variable.clone(),
            group: self.group.clone(),
            dtype: self.dtype,
            shape: self.shape.clone(),
            missing: self.missing.clone(),
        }
    }
}

impl From<&ChunkTask> for ReductionRequest {
    fn from(task: &ChunkTask) -> Self {
        ReductionRequest {
            identifier: task.variable.identifier.clone(),
            variable: task.variable.variable.clone(),
            group: task.variable.group.clone(),
            dtype: task.variable.dtype,
            shape: task.variable.shape.clone(),
            chunk: task.chunk.clone(),
            operation: task.reduction,
            mask: task.mask.as_ref().clone(),
            missing: task.variable.missing.clone(),
        }
    }
}

/// Storage that can reduce chunks of the variables it holds.
#[async_trait]
pub trait ActiveStorage: Send + Sync + std::fmt::Debug {
    /// Reduce one chunk, returning only the partial result.
    async fn submit(&self, request: &ReductionRequest) -> Result<PartialResult, ActiveStorageError>;
}

/// Active storage emulated on top of any [Source].
///
/// Reads, masks and reduces chunks next to the source, so that callers only ever receive
/// partial results.
#[derive(Clone, Debug)]
pub struct EmulatedActiveStorage {
    source: Arc<dyn Source>,
    masks: MaskResolver,
    resource_manager: Arc<ResourceManager>,
    use_rayon: bool,
}

impl EmulatedActiveStorage {
    /// Returns a new EmulatedActiveStorage object.
    ///
    /// # Arguments
    ///
    /// * `source`: Source of variable and mask data
    /// * `resource_manager`: Limits open handles and memory within the storage
    /// * `use_rayon`: Whether to run reductions on the Rayon thread pool
    pub fn new(
        source: Arc<dyn Source>,
        resource_manager: Arc<ResourceManager>,
        use_rayon: bool,
    ) -> Self {
        let masks = MaskResolver::new(source.clone(), resource_manager.clone());
        EmulatedActiveStorage {
            source,
            masks,
            resource_manager,
            use_rayon,
        }
    }
}

#[async_trait]
impl ActiveStorage for EmulatedActiveStorage {
    #[tracing::instrument(
        level = "debug",
        skip(self, request),
        fields(operation = %request.operation, chunk = %request.chunk)
    )]
    async fn submit(
        &self,
        request: &ReductionRequest,
    ) -> Result<PartialResult, ActiveStorageError> {
        let variable = request.variable_ref();
        variable.validate()?;
        read_and_reduce(
            self.source.as_ref(),
            &self.masks,
            &self.resource_manager,
            self.use_rayon,
            &variable,
            &request.chunk,
            request.operation,
            &request.mask,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::Extent;
    use crate::test_utils;
    use crate::types::Scalar;

    #[test]
    fn request_deserialise() {
        let request: ReductionRequest = serde_json::from_str(
            r#"{
                "identifier": "/data",
                "variable": "tas",
                "dtype": "float32",
                "shape": [12],
                "chunk": {"extents": [[0, 4]]},
                "operation": "mean"
            }"#,
        )
        .unwrap();
        assert_eq!(Reduction::Mean, request.operation);
        assert_eq!(MaskSpec::None, request.mask);
        assert_eq!(test_utils::get_test_variable(), request.variable_ref());
    }

    #[tokio::test]
    async fn submit_mean_partial() {
        let active = EmulatedActiveStorage::new(
            test_utils::get_test_source(),
            Arc::new(ResourceManager::default()),
            false,
        );
        let task = ChunkTask {
            variable: Arc::new(test_utils::get_test_variable()),
            chunk: ChunkDescriptor::new(vec![Extent::new(0, 4)]),
            reduction: Reduction::Mean,
            mask: Arc::new(MaskSpec::None),
        };
        let partial = active.submit(&ReductionRequest::from(&task)).await.unwrap();
        // The partial carries the sum and count, not the mean.
        assert_eq!(PartialResult::new(Some(Scalar::Float(6.0)), 4), partial);
    }

    #[tokio::test]
    async fn submit_unknown_variable() {
        let active = EmulatedActiveStorage::new(
            test_utils::get_test_source(),
            Arc::new(ResourceManager::default()),
            false,
        );
        let mut request = ReductionRequest::from(&ChunkTask {
            variable: Arc::new(test_utils::get_test_variable()),
            chunk: ChunkDescriptor::new(vec![Extent::new(0, 4)]),
            reduction: Reduction::Max,
            mask: Arc::new(MaskSpec::None),
        });
        request.variable = "pr".to_string();
        let error = active.submit(&request).await.unwrap_err();
        assert_eq!(crate::error::ErrorKind::SourceRead, error.kind());
    }

    #[tokio::test]
    async fn submit_zero_dimensional() {
        let active = EmulatedActiveStorage::new(
            test_utils::get_test_source(),
            Arc::new(ResourceManager::default()),
            false,
        );
        let request: ReductionRequest = serde_json::from_str(
            r#"{
                "identifier": "/data",
                "variable": "tas",
                "dtype": "float32",
                "shape": [],
                "chunk": {"extents": []},
                "operation": "max"
            }"#,
        )
        .unwrap();
        let error = active.submit(&request).await.unwrap_err();
        assert_eq!(crate::error::ErrorKind::InvalidVariable, error.kind());
    }
}
