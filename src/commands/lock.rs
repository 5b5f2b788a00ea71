//! `leasehold lock ...`

use super::{Outcome, lease_or_default, write_line};
use crate::cli::{LockAcquireArgs, LockAction, LockNameArgs};
use crate::context::Context;
use crate::error::Result;
use crate::locks::MutexCreator;
use std::io::Write;

pub(super) fn dispatch(ctx: &Context, action: LockAction, out: &mut dyn Write) -> Result<Outcome> {
    match action {
        LockAction::Acquire(args) => cmd_acquire(ctx, args, out),
        LockAction::Release(args) => cmd_release(ctx, args, out),
        LockAction::Status(args) => cmd_status(ctx, args, out),
        LockAction::List => cmd_list(ctx, out),
    }
}

fn cmd_acquire(ctx: &Context, args: LockAcquireArgs, out: &mut dyn Write) -> Result<Outcome> {
    let lease = lease_or_default(ctx, args.lease)?;
    let mut lock = ctx.manager().new_mutex(&args.name, &ctx.holder);

    if !lock.try_lock(lease)? {
        let locks = ctx.manager().locks();
        match locks.status(&args.name)? {
            Some(current) => write_line(
                out,
                format_args!("Lock held elsewhere: {}", current.describe(locks.collection().now())),
            )?,
            None => write_line(out, format_args!("Lock '{}' was contended; try again", args.name))?,
        }
        return Ok(Outcome::Contended);
    }

    match lock.expires_at() {
        Some(deadline) => write_line(
            out,
            format_args!(
                "Acquired '{}' as {} until {}",
                args.name,
                ctx.holder,
                deadline.to_rfc3339()
            ),
        )?,
        None => write_line(out, format_args!("Acquired '{}' as {}", args.name, ctx.holder))?,
    }
    Ok(Outcome::Done)
}

fn cmd_release(ctx: &Context, args: LockNameArgs, out: &mut dyn Write) -> Result<Outcome> {
    let mut lock = ctx.manager().new_mutex(&args.name, &ctx.holder);
    if lock.unlock()? {
        write_line(out, format_args!("Released '{}'", args.name))?;
    } else {
        write_line(
            out,
            format_args!("'{}' is not held by {}; nothing released", args.name, ctx.holder),
        )?;
    }
    Ok(Outcome::Done)
}

fn cmd_status(ctx: &Context, args: LockNameArgs, out: &mut dyn Write) -> Result<Outcome> {
    let locks = ctx.manager().locks();
    match locks.status(&args.name)? {
        Some(lock) => write_line(out, format_args!("{}", lock.describe(locks.collection().now())))?,
        None => write_line(out, format_args!("{} (unlocked)", args.name))?,
    }
    Ok(Outcome::Done)
}

fn cmd_list(ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    let locks = ctx.manager().locks();
    let all = locks.list()?;

    if all.is_empty() {
        write_line(out, format_args!("No locks."))?;
        return Ok(Outcome::Done);
    }

    let now = locks.collection().now();
    write_line(out, format_args!("Locks ({}):", all.len()))?;
    for lock in &all {
        write_line(out, format_args!("  {}", lock.describe(now)))?;
    }
    Ok(Outcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_util::{context, output};
    use std::time::Duration;
    use tempfile::TempDir;

    fn acquire(ctx: &Context, name: &str, lease: Option<Duration>) -> (Outcome, String) {
        let mut out = Vec::new();
        let outcome = cmd_acquire(
            ctx,
            LockAcquireArgs {
                name: name.to_string(),
                lease,
            },
            &mut out,
        )
        .unwrap();
        (outcome, output(out))
    }

    fn name(name: &str) -> LockNameArgs {
        LockNameArgs {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_acquire_then_contend() {
        let dir = TempDir::new().unwrap();
        let alice = context(&dir, "alice");
        let bob = context(&dir, "bob");

        let (outcome, text) = acquire(&alice, "deploy", Some(Duration::from_secs(600)));
        assert_eq!(outcome, Outcome::Done);
        assert!(text.contains("Acquired 'deploy' as alice until"), "{text}");

        let (outcome, text) = acquire(&bob, "deploy", None);
        assert_eq!(outcome, Outcome::Contended);
        assert!(text.contains("holder: alice"), "{text}");
    }

    #[test]
    fn test_reacquire_extends() {
        let dir = TempDir::new().unwrap();
        let alice = context(&dir, "alice");

        assert_eq!(acquire(&alice, "deploy", Some(Duration::from_secs(1))).0, Outcome::Done);
        assert_eq!(acquire(&alice, "deploy", Some(Duration::from_secs(3600))).0, Outcome::Done);

        let status = alice.manager().locks().status("deploy").unwrap().unwrap();
        assert!(status.expires_at > chrono::Utc::now() + chrono::Duration::minutes(59));
    }

    #[test]
    fn test_release_only_by_holder() {
        let dir = TempDir::new().unwrap();
        let alice = context(&dir, "alice");
        let bob = context(&dir, "bob");
        acquire(&alice, "deploy", None);

        let mut out = Vec::new();
        assert_eq!(cmd_release(&bob, name("deploy"), &mut out).unwrap(), Outcome::Done);
        assert!(output(out).contains("not held by bob"));
        assert!(alice.manager().locks().status("deploy").unwrap().is_some());

        let mut out = Vec::new();
        cmd_release(&alice, name("deploy"), &mut out).unwrap();
        assert!(output(out).contains("Released 'deploy'"));
        assert_eq!(acquire(&bob, "deploy", None).0, Outcome::Done);
    }

    #[test]
    fn test_status_and_list() {
        let dir = TempDir::new().unwrap();
        let alice = context(&dir, "alice");

        let mut out = Vec::new();
        cmd_status(&alice, name("deploy"), &mut out).unwrap();
        assert_eq!(output(out), "deploy (unlocked)\n");

        let mut out = Vec::new();
        cmd_list(&alice, &mut out).unwrap();
        assert_eq!(output(out), "No locks.\n");

        acquire(&alice, "deploy", Some(Duration::from_secs(600)));
        acquire(&alice, "backup", Some(Duration::from_secs(600)));

        let mut out = Vec::new();
        cmd_status(&alice, name("deploy"), &mut out).unwrap();
        let text = output(out);
        assert!(text.starts_with("deploy (holder: alice, expires in"), "{text}");

        let mut out = Vec::new();
        cmd_list(&alice, &mut out).unwrap();
        let text = output(out);
        assert!(text.starts_with("Locks (2):\n  backup"), "{text}");
        assert!(text.contains("\n  deploy"));
    }
}
