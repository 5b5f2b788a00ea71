//! Command implementations for leasehold.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Commands write their output to the given writer so they
//! can be exercised without a terminal.

mod lock;
mod task;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::context::Context;
use crate::error::{LeaseholdError, Result};
use crate::exit_codes;
use crate::logging;
use std::io::Write;

/// How a command finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The lock is held elsewhere, no task was eligible, or a claim was lost.
    Contended,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Done => exit_codes::SUCCESS,
            Outcome::Contended => exit_codes::CONTENTION,
        }
    }
}

/// Resolve config, install logging, open the store and run the command.
pub fn run(cli: Cli) -> Result<Outcome> {
    let (config, source) = Config::discover(cli.config.as_deref())?;
    logging::init_logging(&config.log_level, config.log_json)?;

    let ctx = Context::open(config, source, cli.root.as_deref(), cli.holder.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dispatch(&ctx, cli.command, &mut out)
}

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(ctx: &Context, command: Command, out: &mut dyn Write) -> Result<Outcome> {
    match command {
        Command::Lock(lock_cmd) => lock::dispatch(ctx, lock_cmd.action, out),
        Command::Task(task_cmd) => task::dispatch(ctx, task_cmd.action, out),
    }
}

/// Convert a lease from the command line, falling back to the configured one.
fn lease_or_default(ctx: &Context, lease: Option<std::time::Duration>) -> Result<chrono::Duration> {
    let Some(lease) = lease else {
        return Ok(ctx.config.default_lease());
    };
    if lease.is_zero() {
        return Err(LeaseholdError::UserError(
            "lease must be greater than 0".to_string(),
        ));
    }
    chrono::Duration::from_std(lease).map_err(|_| {
        LeaseholdError::UserError(format!(
            "lease of {} is too long",
            humantime::format_duration(lease)
        ))
    })
}

fn write_line(out: &mut dyn Write, line: std::fmt::Arguments<'_>) -> Result<()> {
    writeln!(out, "{}", line)
        .map_err(|e| LeaseholdError::UserError(format!("failed to write output: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::test_util::context;
    use super::*;
    use crate::cli::{LockAction, LockCommand, TaskAction, TaskCommand};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(Outcome::Done.exit_code(), 0);
        assert_eq!(Outcome::Contended.exit_code(), 3);
    }

    #[test]
    fn test_lease_or_default() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "w");

        assert_eq!(lease_or_default(&ctx, None).unwrap(), chrono::Duration::seconds(60));
        assert_eq!(
            lease_or_default(&ctx, Some(Duration::from_millis(1500))).unwrap(),
            chrono::Duration::milliseconds(1500)
        );
        assert!(lease_or_default(&ctx, Some(Duration::ZERO)).is_err());
        assert!(lease_or_default(&ctx, Some(Duration::MAX)).is_err());
    }

    #[test]
    fn test_dispatch_routes_both_groups() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "w");
        let mut out = Vec::new();

        let outcome = dispatch(
            &ctx,
            Command::Lock(LockCommand {
                action: LockAction::List,
            }),
            &mut out,
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Done);

        let outcome = dispatch(
            &ctx,
            Command::Task(TaskCommand {
                action: TaskAction::List,
            }),
            &mut out,
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Done);
    }
}
