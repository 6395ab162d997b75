//! Process exit codes of the `strongbox` binary
//!
//! Scripts can tell a missing artifact from a broken configuration without
//! parsing output. Usage errors follow sysexits.h.

pub const SUCCESS: i32 = 0;

/// Unexpected failure
pub const ERROR: i32 = 1;

/// Configuration file missing, unreadable or invalid
pub const CONFIG_ERROR: i32 = 2;

/// No repository serves the requested path
pub const NOT_FOUND: i32 = 3;

/// A remote repository could not be reached
pub const NETWORK_ERROR: i32 = 4;

pub const IO_ERROR: i32 = 5;

/// Bad path, pattern or repository reference (EX_USAGE)
pub const USAGE_ERROR: i32 = 64;
