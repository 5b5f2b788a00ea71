//! Exit code constants for the leasehold CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Store failure (I/O, corrupt documents, timeouts, missing index)
//! - 3: Contention (lock held by another holder, no task available)
//! - 4: Duplicate key (task name already exists)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Store failure: the document store could not complete the operation.
pub const STORE_FAILURE: i32 = 2;

/// Contention: the lock is held elsewhere or no task was eligible.
///
/// Not an error condition for the library; the CLI reports it so shell
/// loops can poll.
pub const CONTENTION: i32 = 3;

/// Duplicate key: an insert collided with an existing document id.
pub const DUPLICATE_KEY: i32 = 4;
