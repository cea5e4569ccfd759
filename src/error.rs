use crate::lexer::LexingError;
use crate::parser::ParseError;
use nix::errno::Errno;
use std::io;
use thiserror::Error;

/// Everything that can go wrong while handling a command line.
///
/// Most variants are user-level: they are reported and the prompt comes back.
/// [`ShellError::is_fatal`] tells the interactive loop which ones end the
/// session.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Lex(#[from] LexingError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("cannot create pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    #[error("wait failed: {0}")]
    Wait(#[source] Errno),

    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),

    #[error("cannot write shell output: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    /// A shell that cannot fork, or cannot talk to its user, cannot go on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Fork(_) | ShellError::Io(_))
    }
}
