//! quysh, a small interactive shell.
//!
//! A command line is split into tokens, parsed one stage at a time into
//! built-in commands and pipeline segments, and run: segments are forked,
//! wired to their pipes and files, and exec'd. Commands ending in `&` are
//! tracked as background jobs and reported when they finish.
//!
//! The main entry point is [`Interpreter`]. The public modules expose the
//! pieces it is built from: [`lexer`], [`parser`], [`command`], [`search`],
//! [`env`], [`builtin`] and [`jobs`].

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod search;

/// Prefix of every message the shell itself prints.
pub const SHELL_NAME: &str = "quysh";

pub use config::Config;
pub use error::ShellError;
pub use interpreter::Interpreter;
