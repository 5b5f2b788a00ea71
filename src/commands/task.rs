//! `leasehold task ...`

use super::{Outcome, lease_or_default, write_line};
use crate::cli::{TaskAction, TaskAddArgs, TaskNameArgs, TaskNextArgs};
use crate::context::Context;
use crate::error::{LeaseholdError, Result};
use crate::task::{Task, TaskHandler};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::io::Write;

pub(super) fn dispatch(ctx: &Context, action: TaskAction, out: &mut dyn Write) -> Result<Outcome> {
    match action {
        TaskAction::Add(args) => cmd_add(ctx, args, out),
        TaskAction::Next(args) => cmd_next(ctx, args, out),
        TaskAction::Complete(args) => cmd_finish(ctx, args, Finish::Complete, out),
        TaskAction::Fail(args) => cmd_finish(ctx, args, Finish::Fail, out),
        TaskAction::List => cmd_list(ctx, out),
    }
}

/// What `task next` prints.
#[derive(Debug, Serialize)]
struct ClaimView<'a> {
    name: &'a str,
    holder: Option<&'a str>,
    /// Base64 of the payload bytes.
    payload: String,
    /// The payload as text, when it is valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lease_expires_at: Option<String>,
}

impl<'a> ClaimView<'a> {
    fn new(task: &'a Task) -> Self {
        Self {
            name: task.name(),
            holder: task.holder(),
            payload: STANDARD.encode(task.payload()),
            payload_text: std::str::from_utf8(task.payload()).ok(),
            lease_expires_at: task.lease_expires_at().map(|at| at.to_rfc3339()),
        }
    }
}

fn cmd_add(ctx: &Context, args: TaskAddArgs, out: &mut dyn Write) -> Result<Outcome> {
    let payload = match (args.payload, args.payload_file) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(path)) => std::fs::read(&path).map_err(|e| {
            LeaseholdError::UserError(format!(
                "failed to read payload file '{}': {}",
                path.display(),
                e
            ))
        })?,
        (None, None) => Vec::new(),
    };

    ctx.manager().add(&args.name, &payload)?;
    write_line(out, format_args!("Added '{}' ({} bytes)", args.name, payload.len()))?;
    Ok(Outcome::Done)
}

fn cmd_next(ctx: &Context, args: TaskNextArgs, out: &mut dyn Write) -> Result<Outcome> {
    let lease = if args.no_lease {
        None
    } else {
        Some(lease_or_default(ctx, args.lease)?)
    };

    let Some(task) = ctx.manager().next(&ctx.holder, lease)? else {
        return Ok(Outcome::Contended);
    };

    let json = serde_json::to_string(&ClaimView::new(&task))
        .map_err(|e| LeaseholdError::UserError(format!("failed to render task: {}", e)))?;
    write_line(out, format_args!("{}", json))?;
    Ok(Outcome::Done)
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Complete,
    Fail,
}

fn cmd_finish(
    ctx: &Context,
    args: TaskNameArgs,
    finish: Finish,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let Some(task) = ctx.manager().tasks().resume(&args.name, &ctx.holder)? else {
        write_line(
            out,
            format_args!("'{}' is not claimed by {}", args.name, ctx.holder),
        )?;
        return Ok(Outcome::Contended);
    };

    let (done, verb) = match finish {
        Finish::Complete => (ctx.manager().complete(&task)?, "Completed"),
        Finish::Fail => (ctx.manager().failed(&task)?, "Returned"),
    };
    if !done {
        // Lost between reading the claim and finalizing it.
        write_line(out, format_args!("Claim on '{}' was lost", args.name))?;
        return Ok(Outcome::Contended);
    }

    write_line(out, format_args!("{} '{}'", verb, args.name))?;
    Ok(Outcome::Done)
}

fn cmd_list(ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    let tasks = ctx.manager().tasks();
    let all = tasks.list()?;

    if all.is_empty() {
        write_line(out, format_args!("No tasks."))?;
        return Ok(Outcome::Done);
    }

    let now = tasks.collection().now();
    write_line(out, format_args!("Tasks ({}):", all.len()))?;
    for task in &all {
        let mut line = format!("  {} [{}]", task.name, task.state_at(now));
        if let Some(holder) = &task.holder {
            line.push_str(&format!(" holder: {}", holder));
        }
        if let Some(deadline) = task.lease_expires_at {
            line.push_str(&format!(" lease until {}", deadline.to_rfc3339()));
        }
        write_line(out, format_args!("{}", line))?;
    }
    Ok(Outcome::Done)
}
