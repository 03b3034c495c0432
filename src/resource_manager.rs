//! Limits on the resources held by chunk work in flight.
//!
//! Each limited resource is a Tokio [Semaphore]. Work acquires a [Permit] before using the
//! resource, and releases it by dropping the permit.

use crate::config::Config;
use crate::error::ActiveStorageError;
use crate::models::{ChunkDescriptor, DType};

use tokio::sync::{Semaphore, SemaphorePermit};

/// A held resource, or `None` when the resource is unlimited.
pub type Permit<'a> = Option<SemaphorePermit<'a>>;

/// A pool of `capacity` units of one resource.
#[derive(Debug)]
struct Pool {
    semaphore: Semaphore,
    capacity: usize,
}

impl Pool {
    /// A pool of `capacity` units. Empty pools would never grant a permit, so hold at least one.
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Pool {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    async fn acquire(&self, units: usize) -> Result<SemaphorePermit<'_>, ActiveStorageError> {
        Ok(self.semaphore.acquire_many(units.try_into()?).await?)
    }
}

/// Limits the source handles, chunk memory and chunk tasks in use by a
/// [Dispatcher](crate::dispatcher::Dispatcher) and the executors it drives.
#[derive(Debug, Default)]
pub struct ResourceManager {
    handles: Option<Pool>,
    memory: Option<Pool>,
    tasks: Option<Pool>,
}

impl ResourceManager {
    /// Returns a ResourceManager. `None` leaves a resource unlimited.
    ///
    /// # Arguments
    ///
    /// * `handle_limit`: Maximum number of concurrently open source handles
    /// * `memory_limit`: Maximum number of bytes of chunk data held at once
    /// * `task_limit`: Maximum number of chunk tasks executing concurrently
    pub fn new(
        handle_limit: Option<usize>,
        memory_limit: Option<usize>,
        task_limit: Option<usize>,
    ) -> Self {
        Self {
            handles: handle_limit.map(Pool::new),
            memory: memory_limit.map(Pool::new),
            tasks: task_limit.map(Pool::new),
        }
    }

    /// Returns a ResourceManager with the limits of a [Config].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.handle_limit, config.memory_limit, config.task_limit)
    }

    /// Wait for an open source handle.
    pub async fn open_handle(&self) -> Result<Permit<'_>, ActiveStorageError> {
        match &self.handles {
            Some(pool) => pool.acquire(1).await.map(Some),
            None => Ok(None),
        }
    }

    /// Wait for memory to hold the elements of one chunk.
    ///
    /// Fails immediately if the chunk could never fit within the memory limit.
    pub async fn chunk_memory(
        &self,
        chunk: &ChunkDescriptor,
        dtype: DType,
    ) -> Result<Permit<'_>, ActiveStorageError> {
        let Some(pool) = &self.memory else {
            return Ok(None);
        };
        let bytes = chunk.size() * dtype.size_of();
        if bytes > pool.capacity {
            return Err(ActiveStorageError::InsufficientMemory {
                requested: bytes,
                total: pool.capacity,
            });
        }
        pool.acquire(bytes).await.map(Some)
    }

    /// Wait for a slot to execute a chunk task.
    pub async fn chunk_task(&self) -> Result<Permit<'_>, ActiveStorageError> {
        match &self.tasks {
            Some(pool) => pool.acquire(1).await.map(Some),
            None => Ok(None),
        }
    }
}
