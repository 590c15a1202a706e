//! Trellis CLI library
//!
//! Argument parsing, logging setup and the maintenance commands behind the `trellis`
//! binary.

pub mod cli;
pub mod commands;
pub mod logging;
