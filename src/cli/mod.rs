//! CLI argument parsing for leasehold.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Leasehold: lease-based locks and claim queues shared through a store directory.
///
/// Every command is one atomic store operation:
/// - Locks are held by a named holder until released or until the lease runs out
/// - Tasks are claimed by one worker at a time and completed or handed back
#[derive(Parser, Debug)]
#[command(name = "leasehold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $LEASEHOLD_CONFIG, then ./leasehold.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Store root directory, overriding `store_root` from the config.
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Identity to act as (default: user@host).
    #[arg(long, global = true, value_name = "ID")]
    pub holder: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for leasehold.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lock commands.
    ///
    /// Acquire, release and inspect named leases.
    Lock(LockCommand),

    /// Task queue commands.
    ///
    /// Add work items, claim the next one, and finalize claims.
    Task(TaskCommand),
}

/// Arguments for the `lock` command.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Acquire or extend a lock.
    ///
    /// Exits with code 3 if another holder owns a live lease.
    Acquire(LockAcquireArgs),

    /// Release a lock held by this holder.
    Release(LockNameArgs),

    /// Show the current holder and deadline of a lock.
    Status(LockNameArgs),

    /// List every lock document, live or expired.
    List,
}

/// Arguments for `lock acquire`.
#[derive(Args, Debug)]
pub struct LockAcquireArgs {
    /// Lock name.
    pub name: String,

    /// Lease length, e.g. `30s`, `5m` (default: `default_lease_seconds`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub lease: Option<Duration>,
}

/// A lock name argument.
#[derive(Args, Debug)]
pub struct LockNameArgs {
    /// Lock name.
    pub name: String,
}

/// Arguments for the `task` command.
#[derive(Parser, Debug)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub action: TaskAction,
}

/// Available task actions.
#[derive(Subcommand, Debug)]
pub enum TaskAction {
    /// Add a new free task.
    ///
    /// Exits with code 4 if the name is already queued.
    Add(TaskAddArgs),

    /// Claim the next eligible task and print it as JSON.
    ///
    /// Exits with code 3 if nothing is eligible.
    Next(TaskNextArgs),

    /// Complete a task claimed by this holder, removing it.
    Complete(TaskNameArgs),

    /// Hand a task claimed by this holder back to the queue.
    Fail(TaskNameArgs),

    /// List every task with its state.
    List,
}

/// Arguments for `task add`.
#[derive(Args, Debug)]
pub struct TaskAddArgs {
    /// Task name.
    pub name: String,

    /// Payload text.
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the payload bytes from a file.
    #[arg(long, value_name = "PATH")]
    pub payload_file: Option<PathBuf>,
}

/// Arguments for `task next`.
#[derive(Args, Debug)]
pub struct TaskNextArgs {
    /// Lease length, e.g. `30s`, `5m` (default: `default_lease_seconds`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub lease: Option<Duration>,

    /// Claim until completed or failed, with no lease.
    #[arg(long, conflicts_with = "lease")]
    pub no_lease: bool,
}

/// A task name argument.
#[derive(Args, Debug)]
pub struct TaskNameArgs {
    /// Task name.
    pub name: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
