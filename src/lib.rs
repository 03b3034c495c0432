//! This crate provides an active storage dispatch and reduction engine. It computes simple
//! reductions over selections of multi-dimensional numeric variables, one chunk at a time. Each
//! chunk may be reduced locally, by reading the chunk in full, or by an active storage backend
//! that reduces the chunk where the data lives and returns only a small partial result. By
//! reducing data in the storage system the volume of data transferred to the caller is vastly
//! reduced.
//!
//! A request is planned eagerly and executed lazily.
//! [Dispatcher::request](dispatcher::Dispatcher::request) validates the operation, the variable
//! and the selection, partitions the selection into chunks, and returns
//! a [DeferredResult](deferred::DeferredResult). No data is read until the result is
//! materialised.
//!
//! The engine is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime, runs chunk tasks concurrently.
//! * [Rayon](rayon) optionally runs CPU-bound reductions on a thread pool.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation.
//! * [Serde](serde) performs (de)serialisation of active storage requests and dataset manifests.

pub mod active;
pub mod array;
pub mod cli;
pub mod config;
pub mod deferred;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod mask;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod operations;
pub mod planner;
pub mod registry;
pub mod resource_manager;
pub mod scheduler;
pub mod source;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
