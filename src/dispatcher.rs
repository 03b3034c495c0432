//! Dispatch of reduction requests across the chunks of a variable.

use crate::active::ActiveStorage;
use crate::config::Config;
use crate::deferred::DeferredResult;
use crate::error::ActiveStorageError;
use crate::executor::{ActiveExecutor, ChunkExecutor, ChunkTask, LocalExecutor};
use crate::mask::MaskResolver;
use crate::metrics::{CHUNKS_EXECUTED, CHUNK_FAILURES, MATERIALIZE_DURATION};
use crate::models::{ChunkHint, MaskSpec, Mode, Selection, VariableRef};
use crate::operation::{PartialResult, Reduction};
use crate::planner::{self, ChunkPlan};
use crate::registry;
use crate::resource_manager::ResourceManager;
use crate::scheduler::{ChunkWork, Scheduler, TokioScheduler};
use crate::source::Source;
use crate::types::Scalar;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use validator::Validate;

/// Plans reduction requests, and executes them chunk by chunk when materialised.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    local: Arc<dyn ChunkExecutor>,
    active: Option<Arc<dyn ChunkExecutor>>,
    scheduler: Arc<dyn Scheduler>,
    resource_manager: Arc<ResourceManager>,
}

impl Dispatcher {
    /// Returns a Dispatcher reading from `source`, with local mode only.
    ///
    /// Chunks are executed as Tokio tasks, within the limits of `config`.
    pub fn new(source: Arc<dyn Source>, config: &Config) -> Self {
        let resource_manager = Arc::new(ResourceManager::from_config(config));
        let masks = MaskResolver::new(source.clone(), resource_manager.clone());
        let local = LocalExecutor::new(source, masks, resource_manager.clone(), config.use_rayon);
        Dispatcher {
            local: Arc::new(local),
            active: None,
            scheduler: Arc::new(TokioScheduler::new(resource_manager.clone())),
            resource_manager,
        }
    }

    /// Enable active mode, delegating chunk reductions to `active`.
    pub fn with_active_storage(mut self, active: Arc<dyn ActiveStorage>) -> Self {
        self.active = Some(Arc::new(ActiveExecutor::new(active)));
        self
    }

    /// Use `scheduler` to run chunk work.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Resource manager shared by the dispatcher's executors and scheduler.
    pub fn resource_manager(&self) -> &Arc<ResourceManager> {
        &self.resource_manager
    }

    fn executor(&self, mode: Mode) -> Result<Arc<dyn ChunkExecutor>, ActiveStorageError> {
        match mode {
            Mode::Local => Ok(self.local.clone()),
            Mode::Active => self
                .active
                .clone()
                .ok_or(ActiveStorageError::ActiveStorageUnavailable),
        }
    }

    /// Plan a reduction of a selection of a variable.
    ///
    /// No I/O is performed until the returned result is materialised. Unsupported operations and
    /// invalid selections or chunk hints fail here; all other errors are returned on
    /// materialisation.
    ///
    /// # Arguments
    ///
    /// * `variable`: The variable to reduce
    /// * `selection`: The part of the variable to reduce
    /// * `operation`: Name of the reduction
    /// * `mask`: Where to find the mask for the variable
    /// * `mode`: Whether chunks are reduced locally or by active storage
    /// * `hint`: How to partition the selection into chunks
    #[tracing::instrument(
        skip(self, variable, mask),
        fields(variable = %variable.path(), identifier = %variable.identifier)
    )]
    pub fn request(
        &self,
        variable: &VariableRef,
        selection: &Selection,
        operation: &str,
        mask: &MaskSpec,
        mode: Mode,
        hint: &ChunkHint,
    ) -> Result<DeferredResult<Scalar>, ActiveStorageError> {
        let reduction = registry::lookup(operation)?;
        variable.validate()?;
        let plan = planner::plan(&variable.shape, selection, hint)?;
        tracing::debug!(chunks = plan.len(), "planned request");
        let request = Request {
            executor: self.executor(mode),
            scheduler: self.scheduler.clone(),
            variable: Arc::new(variable.clone()),
            mask: Arc::new(mask.clone()),
            reduction,
            mode,
            plan,
        };
        let span = tracing::info_span!("materialize", operation = %reduction, mode = %mode);
        Ok(DeferredResult::new(request.materialize().instrument(span)))
    }
}

/// A planned request, captured until materialisation.
struct Request {
    executor: Result<Arc<dyn ChunkExecutor>, ActiveStorageError>,
    scheduler: Arc<dyn Scheduler>,
    variable: Arc<VariableRef>,
    mask: Arc<MaskSpec>,
    reduction: Reduction,
    mode: Mode,
    plan: ChunkPlan,
}

impl Request {
    fn schedule(&self, executor: &Arc<dyn ChunkExecutor>) -> FuturesUnordered<ChunkWork> {
        self.plan
            .iter()
            .map(|chunk| {
                let executor = executor.clone();
                let task = ChunkTask {
                    variable: self.variable.clone(),
                    chunk,
                    reduction: self.reduction,
                    mask: self.mask.clone(),
                };
                self.scheduler
                    .schedule(async move { executor.execute(&task).await }.boxed())
            })
            .collect()
    }

    async fn materialize(self) -> Result<Scalar, ActiveStorageError> {
        let start = Instant::now();
        let result = self.execute().await;
        MATERIALIZE_DURATION
            .with_label_values(&[self.reduction.name()])
            .observe(start.elapsed().as_secs_f64());
        if let Ok(value) = &result {
            tracing::info!(result = %value, chunks = self.plan.len(), "materialised");
        }
        result
    }

    /// Execute every chunk, combining partial results as they complete.
    ///
    /// The first failure is returned, and outstanding chunks are cancelled.
    async fn execute(&self) -> Result<Scalar, ActiveStorageError> {
        let executor = self.executor.clone()?;
        if self.plan.is_empty() {
            return self.reduction.empty_range();
        }
        let mode = self.mode.to_string();
        let operation = self.reduction.name();
        let mut pending = self.schedule(&executor);
        let mut combined: Option<PartialResult> = None;
        while let Some(partial) = pending.next().await {
            let partial = partial.map_err(|err| {
                CHUNK_FAILURES
                    .with_label_values(&[&err.kind().to_string()])
                    .inc();
                err
            })?;
            CHUNKS_EXECUTED.with_label_values(&[&mode, operation]).inc();
            combined = Some(match combined {
                Some(combined) => self.reduction.combine(combined, partial),
                None => partial,
            });
        }
        self.reduction.finalize(combined.unwrap_or_default())
    }
}
