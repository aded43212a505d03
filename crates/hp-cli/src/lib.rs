//! HPyMon CLI library
//!
//! Command implementations and terminal output helpers for the `hpymon`
//! binary.

pub mod commands;
pub mod output;
