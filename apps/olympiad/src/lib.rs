//! # Olympiad
//!
//! Command-line front end for the olympiad-core stage engine.
//!
//! - `cli`: clap command tree and command implementations
//! - `config`: TOML config file and setting resolution

pub mod cli;
pub mod config;
