//! Library components of the `tvx` command-line tool.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
