//! Sources of variable data.
//!
//! A [Source] opens datasets by identifier, returning a [SourceHandle] that reads chunks of the
//! variables within. Handles are closed when dropped.

pub mod memory;
pub mod raw_file;

use crate::array::RawArray;
use crate::error::ActiveStorageError;
use crate::metrics::BYTES_READ;
use crate::models::ChunkDescriptor;
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;

/// A read-only store of datasets containing array variables.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Open the dataset with the given identifier.
    ///
    /// Independent opens of the same identifier may be performed concurrently.
    async fn open(&self, identifier: &str) -> Result<Box<dyn SourceHandle>, ActiveStorageError>;
}

/// An open dataset.
#[async_trait]
pub trait SourceHandle: Send {
    /// Returns the shape of a variable.
    ///
    /// # Arguments
    ///
    /// * `variable`: Variable name
    /// * `group`: Path of groups containing the variable, outermost first
    async fn shape(
        &mut self,
        variable: &str,
        group: &[String],
    ) -> Result<Vec<usize>, ActiveStorageError>;

    /// Read one chunk of a variable into a native-endian, C-ordered array of the chunk's shape.
    ///
    /// # Arguments
    ///
    /// * `variable`: Variable name
    /// * `group`: Path of groups containing the variable, outermost first
    /// * `chunk`: The part of the variable to read
    async fn read(
        &mut self,
        variable: &str,
        group: &[String],
        chunk: &ChunkDescriptor,
    ) -> Result<RawArray, ActiveStorageError>;
}

/// Open a dataset, read one chunk of a variable from it, and close it again.
///
/// The number of concurrently open handles is limited by the resource manager.
#[tracing::instrument(level = "debug", skip(source, resource_manager), fields(chunk = %chunk))]
pub async fn read_chunk(
    source: &dyn Source,
    resource_manager: &ResourceManager,
    identifier: &str,
    variable: &str,
    group: &[String],
    chunk: &ChunkDescriptor,
) -> Result<RawArray, ActiveStorageError> {
    let _handle_permit = resource_manager.open_handle().await?;
    let mut handle = source.open(identifier).await?;
    let raw = handle.read(variable, group, chunk).await?;
    BYTES_READ.inc_by(raw.data.len() as u64);
    Ok(raw)
}
