//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const INCOMPLETE: i32 = 1; // --strict and at least one candidate unavailable
pub const CONFIG_ERROR: i32 = 2;
pub const INVALID_INPUT: i32 = 3;
