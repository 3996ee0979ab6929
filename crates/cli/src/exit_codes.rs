//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args)               |
//! | 60-69   | link / merge     | Config, runtime and empty-result codes   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing subcommand.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Link / merge (60-69)
// =============================================================================

/// Config file failed to parse or validate, or has an unknown `kind`.
pub const EXIT_INVALID_CONFIG: u8 = 60;

/// Runtime failure: unreadable input, missing column, duplicate key,
/// missing geometry, unwritable output.
pub const EXIT_RUNTIME: u8 = 61;

/// Link produced no candidate pairs. The empty table is still written.
pub const EXIT_EMPTY_CANDIDATES: u8 = 62;
