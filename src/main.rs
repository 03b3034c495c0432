//! This file defines the activestorage binary entry point.

use activestorage::active::EmulatedActiveStorage;
use activestorage::cli::{self, CommandLineArgs};
use activestorage::config::Config;
use activestorage::dispatcher::Dispatcher;
use activestorage::error::ActiveStorageError;
use activestorage::metrics;
use activestorage::models::Mode;
use activestorage::planner;
use activestorage::source::raw_file::RawFileSource;
use activestorage::tracing;
use activestorage::types::Scalar;

use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

/// Result of a reduction, printed to stdout.
#[derive(Debug, Serialize)]
struct Output {
    operation: String,
    mode: Mode,
    result: Scalar,
    chunks: usize,
}

/// Describe the variable, then request and materialise the reduction.
async fn run(args: &CommandLineArgs) -> Result<Output, ActiveStorageError> {
    let config = Config::from(args);
    let source = Arc::new(RawFileSource::default());
    let variable = source
        .describe(&args.identifier, &args.variable, &args.group)
        .await?;
    let dispatcher = Dispatcher::new(source.clone(), &config);
    let active = EmulatedActiveStorage::new(
        source,
        dispatcher.resource_manager().clone(),
        config.use_rayon,
    );
    let dispatcher = dispatcher.with_active_storage(Arc::new(active));
    let result = dispatcher.request(
        &variable,
        &args.selection,
        &args.operation,
        &args.mask_spec(),
        args.mode,
        &args.chunks,
    )?;
    let chunks = planner::plan(&variable.shape, &args.selection, &args.chunks)?.len();
    Ok(Output {
        operation: args.operation.clone(),
        mode: args.mode,
        result: result.materialize().await?,
        chunks,
    })
}

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(err) = metrics::register_metrics() {
        ::tracing::warn!("failed to register metrics: {}", err);
    }
    match run(&args).await {
        Ok(output) => match serde_json::to_string(&output) {
            Ok(json) => {
                println!("{}", json);
                if let Ok(metrics) = metrics::gather_metrics() {
                    ::tracing::debug!("metrics:\n{}", metrics);
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                ::tracing::error!("failed to serialise result: {}", err);
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            err.log();
            ExitCode::FAILURE
        }
    }
}
