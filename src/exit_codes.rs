//! Standard exit codes for the pspf binaries
//!
//! The packager CLI contract is 0 on success, 1 on any error. The launcher
//! propagates the payload's exit code verbatim and reserves 1 for its own
//! failures.

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Any error
pub const EXIT_FAILURE: i32 = 1;

/// Panic or unrecoverable error
pub const EXIT_PANIC: i32 = 101;
