//! In-memory source of variable data.

use crate::array::{self, RawArray};
use crate::error::ActiveStorageError;
use crate::models::{variable_path, ChunkDescriptor};
use crate::source::{Source, SourceHandle};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Variables of one dataset, keyed by `group/.../variable` path.
type Dataset = HashMap<String, RawArray>;

/// A [Source] of datasets held in memory.
///
/// Keeps count of open handles, so that callers can check that every handle is closed.
#[derive(Debug, Default)]
pub struct MemorySource {
    datasets: HashMap<String, Arc<Dataset>>,
    open_handles: Arc<AtomicUsize>,
    total_opens: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Returns an empty MemorySource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable to a dataset, creating the dataset if necessary.
    ///
    /// # Arguments
    ///
    /// * `identifier`: Dataset identifier
    /// * `path`: `group/.../variable` path of the variable within the dataset
    /// * `array`: Contents of the variable
    pub fn insert(&mut self, identifier: &str, path: &str, array: RawArray) {
        let dataset = self.datasets.entry(identifier.to_string()).or_default();
        Arc::make_mut(dataset).insert(path.to_string(), array);
    }

    /// Builder form of [MemorySource::insert].
    pub fn with_variable(mut self, identifier: &str, path: &str, array: RawArray) -> Self {
        self.insert(identifier, path, array);
        self
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Number of times a dataset has been opened.
    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn open(&self, identifier: &str) -> Result<Box<dyn SourceHandle>, ActiveStorageError> {
        let dataset = self
            .datasets
            .get(identifier)
            .ok_or_else(|| ActiveStorageError::source_open(identifier, "no such dataset"))?;
        self.total_opens.fetch_add(1, Ordering::SeqCst);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            identifier: identifier.to_string(),
            dataset: dataset.clone(),
            open_handles: self.open_handles.clone(),
        }))
    }
}

/// An open in-memory dataset.
#[derive(Debug)]
struct MemoryHandle {
    identifier: String,
    dataset: Arc<Dataset>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryHandle {
    fn variable(&self, path: &str) -> Result<&RawArray, ActiveStorageError> {
        self.dataset.get(path).ok_or_else(|| {
            ActiveStorageError::source_read(&self.identifier, path, "no such variable")
        })
    }
}

#[async_trait]
impl SourceHandle for MemoryHandle {
    async fn shape(
        &mut self,
        variable: &str,
        group: &[String],
    ) -> Result<Vec<usize>, ActiveStorageError> {
        let path = variable_path(group, variable);
        Ok(self.variable(&path)?.shape.clone())
    }

    async fn read(
        &mut self,
        variable: &str,
        group: &[String],
        chunk: &ChunkDescriptor,
    ) -> Result<RawArray, ActiveStorageError> {
        let path = variable_path(group, variable);
        let whole = self.variable(&path)?;
        array::extract_chunk(whole, chunk)
            .map_err(|err| ActiveStorageError::source_read(&self.identifier, &path, err))
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
