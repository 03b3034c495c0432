//! Lazily computed results.

use crate::error::ActiveStorageError;

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::Mutex;

type Work<T> = Shared<BoxFuture<'static, Result<T, ActiveStorageError>>>;

/// Materialisation state of a [DeferredResult].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    /// Nothing has been computed yet
    Planned,
    /// Materialisation is in progress
    Computing,
    /// Materialisation succeeded, and the value is cached
    Computed,
    /// Materialisation failed, and the error is cached
    Failed,
}

enum State<T> {
    Planned(Work<T>),
    Computing(Work<T>),
    Computed(T),
    Failed(ActiveStorageError),
}

/// A handle to a result that is computed only when first materialised.
///
/// The work is performed at most once. Later materialisations, including those through clones of
/// the handle, return the cached value or error. Dropping a materialisation in progress does not
/// lose the work done so far.
pub struct DeferredResult<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for DeferredResult<T> {
    fn clone(&self) -> Self {
        DeferredResult {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for DeferredResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredResult")
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> DeferredResult<T> {
    /// Returns a DeferredResult that will be computed by `work`.
    ///
    /// `work` is not polled until the result is materialised.
    pub fn new(work: impl Future<Output = Result<T, ActiveStorageError>> + Send + 'static) -> Self {
        DeferredResult {
            state: Arc::new(Mutex::new(State::Planned(work.boxed().shared()))),
        }
    }

    /// Compute the result if necessary, and return it.
    pub async fn materialize(&self) -> Result<T, ActiveStorageError> {
        let work = {
            let mut state = self.state.lock().await;
            match &*state {
                State::Computed(value) => return Ok(value.clone()),
                State::Failed(error) => return Err(error.clone()),
                State::Planned(work) | State::Computing(work) => {
                    let work = work.clone();
                    *state = State::Computing(work.clone());
                    work
                }
            }
        };
        let result = work.await;
        let mut state = self.state.lock().await;
        if let State::Computing(_) = &*state {
            *state = match &result {
                Ok(value) => State::Computed(value.clone()),
                Err(error) => {
                    error.log();
                    State::Failed(error.clone())
                }
            };
        }
        result
    }

    /// Returns a DeferredResult that applies `f` to the materialised value of this one.
    ///
    /// Neither this result nor `f` is computed until the returned result is materialised.
    pub fn map<U, F>(&self, f: F) -> DeferredResult<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let input = self.clone();
        DeferredResult::new(async move { Ok(f(input.materialize().await?)) })
    }
}

impl<T> DeferredResult<T> {
    /// Returns the materialisation state of the result.
    pub fn status(&self) -> Status {
        match self.state.try_lock() {
            Ok(state) => match &*state {
                State::Planned(_) => Status::Planned,
                State::Computing(_) => Status::Computing,
                State::Computed(_) => Status::Computed,
                State::Failed(_) => Status::Failed,
            },
            // The lock is only held briefly, while materialisation starts or finishes.
            Err(_) => Status::Computing,
        }
    }
}
