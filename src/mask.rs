//! Resolution of masks for chunks of a variable.

use crate::array;
use crate::error::ActiveStorageError;
use crate::metrics::BYTES_READ;
use crate::models::{ChunkDescriptor, MaskSpec, VariableRef};
use crate::resource_manager::ResourceManager;
use crate::source::Source;

use ndarray::ArrayD;
use std::sync::Arc;

/// Reads the part of a mask variable aligned with a chunk of a data variable.
#[derive(Clone, Debug)]
pub struct MaskResolver {
    source: Arc<dyn Source>,
    resource_manager: Arc<ResourceManager>,
}

impl MaskResolver {
    /// Returns a MaskResolver reading masks from `source`.
    pub fn new(source: Arc<dyn Source>, resource_manager: Arc<ResourceManager>) -> Self {
        MaskResolver {
            source,
            resource_manager,
        }
    }

    /// Returns the mask for a chunk of a variable, or `None` if the variable is not masked.
    ///
    /// True mask elements exclude the corresponding data elements.
    ///
    /// # Arguments
    ///
    /// * `spec`: Where to find the mask
    /// * `variable`: The masked variable
    /// * `chunk`: The chunk of `variable` to mask
    #[tracing::instrument(level = "debug", skip(self, variable), fields(chunk = %chunk))]
    pub async fn resolve(
        &self,
        spec: &MaskSpec,
        variable: &VariableRef,
        chunk: &ChunkDescriptor,
    ) -> Result<Option<ArrayD<bool>>, ActiveStorageError> {
        let (identifier, mask_variable, group) = match spec {
            MaskSpec::None => return Ok(None),
            MaskSpec::Internal {
                variable: mask_variable,
                group,
            } => (variable.identifier.as_str(), mask_variable, group),
            MaskSpec::External {
                identifier,
                variable: mask_variable,
                group,
            } => (identifier.as_str(), mask_variable, group),
        };
        let _handle_permit = self.resource_manager.open_handle().await?;
        let mut handle = self.source.open(identifier).await?;
        let shape = handle.shape(mask_variable, group).await?;
        if shape != variable.shape {
            return Err(ActiveStorageError::MaskAlignment {
                mask: shape,
                data: variable.shape.clone(),
            });
        }
        let raw = handle.read(mask_variable, group, chunk).await?;
        BYTES_READ.inc_by(raw.data.len() as u64);
        let mask = array::build_mask(&raw)
            .map_err(|err| ActiveStorageError::source_read(identifier, mask_variable, err))?;
        if mask.shape() != chunk.shape().as_slice() {
            return Err(ActiveStorageError::MaskAlignment {
                mask: mask.shape().to_vec(),
                data: chunk.shape(),
            });
        }
        Ok(Some(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::array::RawArray;
    use crate::models::{DType, Extent};
    use crate::source::memory::MemorySource;

    use ndarray::array;

    fn get_test_source() -> Arc<MemorySource> {
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let land: Vec<u32> = (0..12).map(|x| x % 2).collect();
        let sea = RawArray::from_elements(DType::Float64, vec![12], &[1.0_f64; 12]);
        let short = RawArray::from_elements(DType::Int32, vec![6], &[0_i32; 6]);
        Arc::new(
            MemorySource::new()
                .with_variable(
                    "/data",
                    "tas",
                    RawArray::from_elements(DType::Float32, vec![12], &data),
                )
                .with_variable(
                    "/data",
                    "fx/land",
                    RawArray::from_elements(DType::Uint32, vec![12], &land),
                )
                .with_variable("/masks", "sea", sea)
                .with_variable("/masks", "short", short),
        )
    }

    fn get_test_resolver(source: Arc<MemorySource>) -> MaskResolver {
        MaskResolver::new(source, Arc::new(ResourceManager::default()))
    }

    fn get_test_variable() -> VariableRef {
        VariableRef::new("/data", "tas", DType::Float32, vec![12])
    }

    #[tokio::test]
    async fn resolve_none_does_no_io() {
        let source = get_test_source();
        let resolver = get_test_resolver(source.clone());
        let chunk = ChunkDescriptor::new(vec![Extent::new(0, 4)]);
        let mask = resolver
            .resolve(&MaskSpec::None, &get_test_variable(), &chunk)
            .await
            .unwrap();
        assert!(mask.is_none());
        assert_eq!(0, source.total_opens());
    }

    #[tokio::test]
    async fn resolve_internal() {
        let source = get_test_source();
        let resolver = get_test_resolver(source.clone());
        let spec = MaskSpec::Internal {
            variable: "land".to_string(),
            group: vec!["fx".to_string()],
        };
        let chunk = ChunkDescriptor::new(vec![Extent::new(4, 8)]);
        let mask = resolver
            .resolve(&spec, &get_test_variable(), &chunk)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(array![false, true, false, true].into_dyn(), mask);
        assert_eq!(0, source.open_handles());
    }

    #[tokio::test]
    async fn resolve_external() {
        let resolver = get_test_resolver(get_test_source());
        let spec = MaskSpec::External {
            identifier: "/masks".to_string(),
            variable: "sea".to_string(),
            group: vec![],
        };
        let chunk = ChunkDescriptor::new(vec![Extent::new(0, 2)]);
        let mask = resolver
            .resolve(&spec, &get_test_variable(), &chunk)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(array![true, true].into_dyn(), mask);
    }

    #[tokio::test]
    async fn resolve_misaligned() {
        let source = get_test_source();
        let resolver = get_test_resolver(source.clone());
        let spec = MaskSpec::External {
            identifier: "/masks".to_string(),
            variable: "short".to_string(),
            group: vec![],
        };
        let chunk = ChunkDescriptor::new(vec![Extent::new(0, 4)]);
        match resolver
            .resolve(&spec, &get_test_variable(), &chunk)
            .await
            .unwrap_err()
        {
            ActiveStorageError::MaskAlignment { mask, data } => {
                assert_eq!(vec![6], mask);
                assert_eq!(vec![12], data);
            }
            error => panic!("unexpected error {error:?}"),
        }
        assert_eq!(0, source.open_handles());
    }

    #[tokio::test]
    async fn resolve_missing_mask_variable() {
        let resolver = get_test_resolver(get_test_source());
        let spec = MaskSpec::Internal {
            variable: "nope".to_string(),
            group: vec![],
        };
        let chunk = ChunkDescriptor::new(vec![Extent::new(0, 4)]);
        let error = resolver
            .resolve(&spec, &get_test_variable(), &chunk)
            .await
            .unwrap_err();
        assert_eq!(crate::error::ErrorKind::SourceRead, error.kind());
    }
}
