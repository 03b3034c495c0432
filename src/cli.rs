//! Command Line Interface (CLI) arguments.

use crate::config;
use crate::models::{ChunkHint, MaskSpec, Mode, Selection};

use byte_unit::Byte;
use clap::Parser;

/// Reduce a variable stored in a raw file dataset, printing the result as JSON
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// Directory containing the dataset's manifest.json
    #[arg(env = "ACTIVESTORAGE_IDENTIFIER")]
    pub identifier: String,
    /// Name of the variable to reduce
    #[arg(long, env = "ACTIVESTORAGE_VARIABLE")]
    pub variable: String,
    /// Slash separated path of groups containing the variable
    #[arg(long, value_delimiter = '/', env = "ACTIVESTORAGE_GROUP")]
    pub group: Vec<String>,
    /// Reduction to perform
    #[arg(long, default_value = "max", env = "ACTIVESTORAGE_OPERATION")]
    pub operation: String,
    /// Where chunk reductions are computed
    #[arg(long, value_enum, default_value_t = Mode::Local, env = "ACTIVESTORAGE_MODE")]
    pub mode: Mode,
    /// `all`, or comma separated `start:stop` extents, one per dimension
    #[arg(long, default_value = "all", env = "ACTIVESTORAGE_SELECTION")]
    pub selection: Selection,
    /// `whole`, `split=<parts>` or `shape=<size>,<size>,...`
    #[arg(long, default_value = "whole", env = "ACTIVESTORAGE_CHUNKS")]
    pub chunks: ChunkHint,
    /// Variable containing the mask. Nonzero mask elements are excluded.
    #[arg(long, env = "ACTIVESTORAGE_MASK_VARIABLE")]
    pub mask_variable: Option<String>,
    /// Slash separated path of groups containing the mask variable
    #[arg(long, value_delimiter = '/', env = "ACTIVESTORAGE_MASK_GROUP")]
    pub mask_group: Vec<String>,
    /// Dataset containing the mask variable, if not the dataset being reduced
    #[arg(long, requires = "mask_variable", env = "ACTIVESTORAGE_MASK_IDENTIFIER")]
    pub mask_identifier: Option<String>,
    /// Maximum number of chunk tasks executing concurrently
    #[arg(
        long,
        default_value_t = config::default_task_limit(),
        value_parser = parse_limit,
        env = "ACTIVESTORAGE_TASK_LIMIT"
    )]
    pub task_limit: usize,
    /// Maximum number of concurrently open source handles
    #[arg(long, value_parser = parse_limit, env = "ACTIVESTORAGE_HANDLE_LIMIT")]
    pub handle_limit: Option<usize>,
    /// Memory limit for chunk data, e.g. `512MiB`
    #[arg(long, value_parser = parse_memory_limit, env = "ACTIVESTORAGE_MEMORY_LIMIT")]
    pub memory_limit: Option<usize>,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "ACTIVESTORAGE_USE_RAYON")]
    pub use_rayon: bool,
}

impl CommandLineArgs {
    /// Returns the mask specification described by the mask arguments.
    pub fn mask_spec(&self) -> MaskSpec {
        match (&self.mask_identifier, &self.mask_variable) {
            (_, None) => MaskSpec::None,
            (None, Some(variable)) => MaskSpec::Internal {
                variable: variable.clone(),
                group: self.mask_group.clone(),
            },
            (Some(identifier), Some(variable)) => MaskSpec::External {
                identifier: identifier.clone(),
                variable: variable.clone(),
                group: self.mask_group.clone(),
            },
        }
    }
}

/// Parse a concurrency limit, which must allow at least one holder.
fn parse_limit(limit: &str) -> Result<usize, String> {
    match limit.parse::<usize>() {
        Ok(0) => Err("limit must be at least 1".to_string()),
        Ok(limit) => Ok(limit),
        Err(err) => Err(err.to_string()),
    }
}

/// Parse a size with an optional unit, e.g. `100`, `4KB` or `1.5GiB`.
fn parse_memory_limit(limit: &str) -> Result<usize, String> {
    let bytes = Byte::parse_str(limit, /* ignore case */ true)
        .map_err(|err| err.to_string())?
        .as_u64();
    usize::try_from(bytes).map_err(|err| err.to_string())
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
