//! Directory-backed source of raw binary arrays.
//!
//! A dataset is a directory containing a `manifest.json` file, which describes each variable:
//!
//! ```json
//! {
//!   "tas": {"file": "tas.bin", "dtype": "float32", "shape": [12, 4]},
//!   "fx/sftlf": {"file": "sftlf.bin", "dtype": "uint32", "shape": [12, 4], "byte_order": "big"}
//! }
//! ```
//!
//! Variable data is stored as a C-ordered array starting at `offset` bytes into `file`.

use crate::array::{self, RawArray};
use crate::error::ActiveStorageError;
use crate::models::{variable_path, ChunkDescriptor, DType, VariableRef};
use crate::source::{Source, SourceHandle};
use crate::types::{byte_order, ByteOrder, DValue, Missing};

use async_trait::async_trait;
use bytes::Bytes;
use ndarray::IxDyn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use validator::Validate;

/// Name of the file describing the variables of a dataset.
pub const MANIFEST: &str = "manifest.json";

/// Location and layout of one variable.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Data file, relative to the dataset directory
    pub file: PathBuf,
    /// Element type
    pub dtype: DType,
    /// Shape of the array
    pub shape: Vec<usize>,
    /// Byte order of the stored elements
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Offset in bytes of the first element
    #[serde(default)]
    pub offset: u64,
    /// Missing data convention of the variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing<DValue>>,
}

/// Variables of a dataset, keyed by `group/.../variable` path.
pub type Manifest = HashMap<String, ManifestEntry>;

/// A [Source] of datasets stored as directories of raw binary files.
///
/// Identifiers are directory paths, resolved relative to a root directory.
#[derive(Clone, Debug, Default)]
pub struct RawFileSource {
    root: PathBuf,
}

impl RawFileSource {
    /// Returns a RawFileSource resolving identifiers relative to `root`.
    ///
    /// Absolute identifiers are used as they are.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        RawFileSource { root: root.into() }
    }

    fn dataset_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Returns a [VariableRef] describing a variable in a dataset.
    ///
    /// # Arguments
    ///
    /// * `identifier`: Dataset identifier
    /// * `variable`: Variable name
    /// * `group`: Path of groups containing the variable, outermost first
    pub async fn describe(
        &self,
        identifier: &str,
        variable: &str,
        group: &[String],
    ) -> Result<VariableRef, ActiveStorageError> {
        let manifest = read_manifest(identifier, &self.dataset_dir(identifier)).await?;
        let path = variable_path(group, variable);
        let entry = lookup(&manifest, identifier, &path)?;
        let variable = VariableRef::new(identifier, variable, entry.dtype, entry.shape.clone())
            .with_group(group.to_vec());
        let variable = match &entry.missing {
            Some(missing) => variable.with_missing(missing.clone()),
            None => variable,
        };
        variable.validate()?;
        Ok(variable)
    }
}

#[async_trait]
impl Source for RawFileSource {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn open(&self, identifier: &str) -> Result<Box<dyn SourceHandle>, ActiveStorageError> {
        let dir = self.dataset_dir(identifier);
        let manifest = read_manifest(identifier, &dir).await?;
        Ok(Box::new(RawFileHandle {
            identifier: identifier.to_string(),
            dir,
            manifest,
            files: HashMap::new(),
        }))
    }
}

/// Read and parse the manifest of a dataset.
async fn read_manifest(identifier: &str, dir: &Path) -> Result<Manifest, ActiveStorageError> {
    let contents = tokio::fs::read(dir.join(MANIFEST))
        .await
        .map_err(|err| ActiveStorageError::source_open(identifier, err))?;
    serde_json::from_slice(&contents)
        .map_err(|err| ActiveStorageError::source_open(identifier, err))
}

fn lookup<'a>(
    manifest: &'a Manifest,
    identifier: &str,
    path: &str,
) -> Result<&'a ManifestEntry, ActiveStorageError> {
    manifest
        .get(path)
        .ok_or_else(|| ActiveStorageError::source_read(identifier, path, "no such variable"))
}

/// Element ranges `(start, len)` of the contiguous runs of a C-ordered array covered by a chunk.
///
/// Trailing dimensions covered in full are merged into a single run.
fn contiguous_runs(shape: &[usize], chunk: &ChunkDescriptor) -> Vec<(usize, usize)> {
    if chunk.size() == 0 {
        return vec![];
    }
    let ndim = shape.len();
    let strides: Vec<usize> = (0..ndim).map(|dim| shape[dim + 1..].iter().product()).collect();
    // Find the outermost dimension of a run: all dimensions after it are covered in full.
    let mut run_dim = ndim - 1;
    while run_dim > 0 {
        let extent = chunk.extents[run_dim];
        if extent.start != 0 || extent.stop != shape[run_dim] {
            break;
        }
        run_dim -= 1;
    }
    let run_len = chunk.extents[run_dim].len() * strides[run_dim];
    let outer: Vec<usize> = chunk.extents[..run_dim].iter().map(|extent| extent.len()).collect();
    ndarray::indices(IxDyn(&outer))
        .into_iter()
        .map(|index| {
            let start = (0..run_dim)
                .map(|dim| (index[dim] + chunk.extents[dim].start) * strides[dim])
                .sum::<usize>()
                + chunk.extents[run_dim].start * strides[run_dim];
            (start, run_len)
        })
        .collect()
}

/// An open raw file dataset.
///
/// Data files are opened on first use and closed with the handle.
#[derive(Debug)]
struct RawFileHandle {
    identifier: String,
    dir: PathBuf,
    manifest: Manifest,
    files: HashMap<PathBuf, File>,
}

impl RawFileHandle {
    async fn read_runs(
        &mut self,
        entry: &ManifestEntry,
        chunk: &ChunkDescriptor,
    ) -> Result<Vec<u8>, std::io::Error> {
        let size = entry.dtype.size_of();
        let file = match self.files.entry(entry.file.clone()) {
            std::collections::hash_map::Entry::Occupied(file) => file.into_mut(),
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let file = File::open(self.dir.join(&entry.file)).await?;
                vacant.insert(file)
            }
        };
        let mut data = vec![0; chunk.size() * size];
        let mut position = 0;
        for (start, len) in contiguous_runs(&entry.shape, chunk) {
            let offset = entry.offset + (start * size) as u64;
            file.seek(SeekFrom::Start(offset)).await?;
            let end = position + len * size;
            file.read_exact(&mut data[position..end]).await?;
            position = end;
        }
        if !entry.byte_order.is_native() {
            byte_order::swap_bytes(&mut data, size);
        }
        Ok(data)
    }
}

#[async_trait]
impl SourceHandle for RawFileHandle {
    async fn shape(
        &mut self,
        variable: &str,
        group: &[String],
    ) -> Result<Vec<usize>, ActiveStorageError> {
        let path = variable_path(group, variable);
        Ok(lookup(&self.manifest, &self.identifier, &path)?.shape.clone())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(identifier = %self.identifier))]
    async fn read(
        &mut self,
        variable: &str,
        group: &[String],
        chunk: &ChunkDescriptor,
    ) -> Result<RawArray, ActiveStorageError> {
        let path = variable_path(group, variable);
        let entry = lookup(&self.manifest, &self.identifier, &path)?.clone();
        array::check_bounds(&entry.shape, chunk)
            .map_err(|err| ActiveStorageError::source_read(&self.identifier, &path, err))?;
        let data = self
            .read_runs(&entry, chunk)
            .await
            .map_err(|err| ActiveStorageError::source_read(&self.identifier, &path, err))?;
        Ok(RawArray::new(Bytes::from(data), entry.dtype, chunk.shape()))
    }
}
