//! coderev CLI library
//!
//! Command implementations and terminal output helpers for the `coderev`
//! binary. The binary itself (src/main.rs) only parses arguments and
//! dispatches here.

pub mod commands;
pub mod output;
