//! Scheduling of chunk work.

use crate::error::ActiveStorageError;
use crate::operation::PartialResult;
use crate::resource_manager::ResourceManager;

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A unit of lazy chunk work, or the future of its scheduled execution.
pub type ChunkWork = BoxFuture<'static, Result<PartialResult, ActiveStorageError>>;

/// Decides where and when chunk work runs.
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Schedule a unit of work, returning a future of its result.
    ///
    /// Dropping the returned future cancels the work if it has not yet completed.
    fn schedule(&self, work: ChunkWork) -> ChunkWork;
}

/// Runs chunk work on the task that awaits it.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule(&self, work: ChunkWork) -> ChunkWork {
        work
    }
}

/// Spawns chunk work onto the Tokio runtime, limiting the number of concurrent tasks.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    resource_manager: Arc<ResourceManager>,
}

impl TokioScheduler {
    /// Returns a TokioScheduler limited by the task resource of `resource_manager`.
    pub fn new(resource_manager: Arc<ResourceManager>) -> Self {
        TokioScheduler { resource_manager }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, work: ChunkWork) -> ChunkWork {
        let resource_manager = self.resource_manager.clone();
        let handle = tokio::spawn(async move {
            let _task_permit = resource_manager.chunk_task().await?;
            work.await
        });
        let mut task = AbortOnDrop(handle);
        async move { (&mut task.0).await? }.boxed()
    }
}

/// Aborts a spawned task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
