use anyhow::bail;
use clap::{Parser, ValueEnum};
use spindle_core::config::{DEFAULT_CAPACITY, DEFAULT_STOP_TIMEOUT_MS};
use spindle_core::{DrainPolicy, WorkerConfig};

use crate::operation::Operation;

/// Command-line arguments for the `spindle` console.
///
/// Every option can also come from the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "spindle",
    version,
    about = "Reads integers from stdin, runs each through a background worker, prints the results"
)]
pub struct CliArgs {
    /// Number of requests that may wait in the queue before input blocks.
    ///
    /// Environment variable: `SPINDLE_CAPACITY`
    #[arg(long, env = "SPINDLE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// What to do with queued requests on shutdown.
    ///
    /// Environment variable: `SPINDLE_DRAIN`
    #[arg(long, env = "SPINDLE_DRAIN", value_enum, default_value_t = DrainArg::Drain)]
    pub drain: DrainArg,

    /// How long shutdown waits for the worker, in milliseconds.
    ///
    /// Environment variable: `SPINDLE_STOP_TIMEOUT_MS`
    #[arg(long, env = "SPINDLE_STOP_TIMEOUT_MS", default_value_t = DEFAULT_STOP_TIMEOUT_MS)]
    pub stop_timeout_ms: u64,

    /// Computation applied to every input value.
    ///
    /// Environment variable: `SPINDLE_OPERATION`
    #[arg(long, env = "SPINDLE_OPERATION", value_enum, default_value_t = Operation::Passthrough)]
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DrainArg {
    Drain,
    Abandon,
}

impl From<DrainArg> for DrainPolicy {
    fn from(arg: DrainArg) -> Self {
        match arg {
            DrainArg::Drain => DrainPolicy::Drain,
            DrainArg::Abandon => DrainPolicy::Abandon,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub worker: WorkerConfig,
    pub operation: Operation,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.capacity == 0 {
            bail!("SPINDLE_CAPACITY must be greater than 0");
        }
        if args.stop_timeout_ms == 0 {
            bail!("SPINDLE_STOP_TIMEOUT_MS must be greater than 0");
        }

        let worker = WorkerConfig {
            capacity: args.capacity,
            drain_policy: args.drain.into(),
            stop_timeout_ms: args.stop_timeout_ms,
        };
        worker.validate()?;

        Ok(Self {
            worker,
            operation: args.operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = CliArgs::try_parse_from(["spindle"]).unwrap();
        let config = CliConfig::try_from(args).unwrap();
        assert_eq!(config.worker, WorkerConfig::default());
        assert_eq!(config.operation, Operation::Passthrough);
    }

    #[test]
    fn flags_override_defaults() {
        let args = CliArgs::try_parse_from([
            "spindle",
            "--capacity",
            "1",
            "--drain",
            "abandon",
            "--operation",
            "double",
        ])
        .unwrap();
        let config = CliConfig::try_from(args).unwrap();
        assert_eq!(config.worker.capacity, 1);
        assert_eq!(config.worker.drain_policy, DrainPolicy::Abandon);
        assert_eq!(config.operation, Operation::Double);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let args = CliArgs::try_parse_from(["spindle", "--capacity", "0"]).unwrap();
        let err = CliConfig::try_from(args).unwrap_err();
        assert!(err.to_string().contains("SPINDLE_CAPACITY"));
    }

    #[test]
    fn huge_capacity_is_an_error_not_a_panic() {
        let capacity = usize::MAX.to_string();
        let args = CliArgs::try_parse_from(["spindle", "--capacity", &capacity]).unwrap();
        let err = CliConfig::try_from(args).unwrap_err();
        assert!(err.to_string().contains("queue capacity"));
    }
}
