//! Runtime configuration of a [Dispatcher](crate::dispatcher::Dispatcher).

use crate::cli::CommandLineArgs;

/// Limits and execution options used by the library, independent of how they were obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Maximum number of chunk tasks executing concurrently
    pub task_limit: Option<usize>,
    /// Maximum number of concurrently open source handles
    pub handle_limit: Option<usize>,
    /// Maximum number of bytes of chunk data held in memory at once
    pub memory_limit: Option<usize>,
    /// Whether to run CPU-bound reductions on the Rayon thread pool
    pub use_rayon: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            task_limit: Some(default_task_limit()),
            handle_limit: None,
            memory_limit: None,
            use_rayon: false,
        }
    }
}

impl From<&CommandLineArgs> for Config {
    fn from(args: &CommandLineArgs) -> Self {
        Config {
            task_limit: Some(args.task_limit),
            handle_limit: args.handle_limit,
            memory_limit: args.memory_limit,
            use_rayon: args.use_rayon,
        }
    }
}

/// One fewer than the number of CPUs, leaving one for the runtime, but at least one.
pub fn default_task_limit() -> usize {
    std::cmp::max(num_cpus::get().saturating_sub(1), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_task_limit_at_least_one() {
        assert!(default_task_limit() >= 1);
        assert_eq!(Some(default_task_limit()), Config::default().task_limit);
    }
}
