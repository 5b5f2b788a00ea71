//! Filesystem helpers for the file-backed store.
//!
//! Document files are only ever replaced whole via [`atomic_write`], so a
//! reader that skips the lock (such as `find`) sees either the old or the new
//! document, never a torn one.

pub mod atomic;

pub use atomic::{atomic_write, remove_if_exists};
