//! Turns a token sequence into launchable stages.
//!
//! Parsing is lazy: [`Parser`] yields one [`Stage`] at a time, so everything
//! to the left of a syntax error has already been run by the time the error
//! is reported, and nothing to the right of it ever is.

use crate::builtin::{self, Builtin};
use crate::command::{ExecMode, IoPlan, PipeSlot, PipelineSegment, Sink, Source, WriteMode};
use crate::env::Environment;
use crate::lexer::{Operator, Token};
use crate::search::SearchPath;
use std::path::PathBuf;
use thiserror::Error;

/// Errors found while building pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An operator where a command name was expected.
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedOperator(Operator),
    /// Nothing follows an operator that needs a command after it.
    #[error("syntax error: expected a command after `{0}'")]
    MissingCommand(Operator),
    /// A redirection without a file name.
    #[error("syntax error: expected a file name after `{0}'")]
    MissingTarget(Operator),
    /// Both `|` and `<` feed the same segment.
    #[error("syntax error: {0}: input is both piped and redirected")]
    ConflictingInput(String),
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("{0}: built-in commands cannot be piped or redirected")]
    BuiltinRedirect(String),
}

/// One unit of work produced by the parser, in source order.
#[derive(Debug, PartialEq)]
pub enum Stage {
    Builtin(Builtin),
    Segment(PipelineSegment),
}

/// Substitute variables in one word.
///
/// - `~` becomes the home directory, and `~/rest` becomes `$HOME/rest`;
///   without a home directory the word is left alone.
/// - `$NAME` becomes the value of `NAME`, or the empty string if unset.
pub fn expand(word: &str, env: &Environment) -> String {
    if let Some(name) = word.strip_prefix('$') {
        return env.get_var(name).unwrap_or_default();
    }
    match env.home() {
        Some(home) if word == "~" => home,
        Some(home) if word.starts_with("~/") => format!("{}{}", home, &word[1..]),
        _ => word.to_string(),
    }
}

/// A lazy pipeline builder over one command line.
///
/// Words are expanded against the environment as each stage is parsed, so a
/// `set` earlier on the line is visible to the stages after it.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// The slot the next segment reads from, when the previous one ended in `|`.
    pending_input: Option<PipeSlot>,
    next_slot: PipeSlot,
    done: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            pending_input: None,
            next_slot: PipeSlot::A,
            done: false,
        }
    }

    /// Parse the next stage; `None` once the line is exhausted or an error
    /// has been returned.
    pub fn next_stage(
        &mut self,
        env: &Environment,
        search_path: &SearchPath,
    ) -> Option<Result<Stage, ParseError>> {
        if self.done {
            return None;
        }
        if self.pos >= self.tokens.len() {
            self.done = true;
            return self
                .pending_input
                .take()
                .map(|_| Err(ParseError::MissingCommand(Operator::Pipe)));
        }
        let stage = self.parse_stage(env, search_path);
        if stage.is_err() {
            self.done = true;
        }
        Some(stage)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn consume_if(&mut self, op: Operator) -> bool {
        if self.peek() == Some(&Token::Operator(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_target(&mut self, after: Operator, env: &Environment) -> Result<PathBuf, ParseError> {
        match self.consume() {
            Some(Token::Word(target)) => Ok(PathBuf::from(expand(target, env))),
            _ => Err(ParseError::MissingTarget(after)),
        }
    }

    /// Parse one stage: a command, its arguments and the operator ending it.
    fn parse_stage(&mut self, env: &Environment, search_path: &SearchPath) -> Result<Stage, ParseError> {
        let name = match self.consume() {
            Some(Token::Word(name)) => expand(name, env),
            Some(Token::Operator(op)) => return Err(ParseError::UnexpectedOperator(*op)),
            None => unreachable!("parse_stage called at end of input"),
        };

        let mut argv = vec![name.clone()];
        let mut input_file = None;
        let terminator = loop {
            match self.consume() {
                None => break None,
                Some(Token::Word(arg)) => argv.push(expand(arg, env)),
                Some(Token::Operator(Operator::RedirectIn)) => {
                    input_file = Some(self.expect_target(Operator::RedirectIn, env)?);
                }
                Some(Token::Operator(op)) => break Some(*op),
            }
        };

        if builtin::is_builtin(&name) {
            let piped = self.pending_input.take().is_some()
                || input_file.is_some()
                || matches!(terminator, Some(Operator::Pipe | Operator::RedirectOut));
            if piped {
                return Err(ParseError::BuiltinRedirect(name));
            }
            return Builtin::parse(&name, &argv[1..])
                .map(Stage::Builtin)
                .ok_or(ParseError::CommandNotFound(name));
        }

        let path = search_path
            .resolve(&name)
            .ok_or_else(|| ParseError::CommandNotFound(name.clone()))?;

        let stdin = match (self.pending_input.take(), input_file) {
            (Some(_), Some(_)) => return Err(ParseError::ConflictingInput(name)),
            (Some(slot), None) => Source::Pipe(slot),
            (None, Some(file)) => Source::File(file),
            (None, None) => Source::Inherit,
        };

        let (stdout, mode) = match terminator {
            None | Some(Operator::Separator) => (Sink::Inherit, ExecMode::Foreground),
            Some(Operator::Background) => (Sink::Inherit, ExecMode::Background),
            Some(Operator::Pipe) => {
                let slot = self.next_slot;
                self.next_slot = slot.other();
                self.pending_input = Some(slot);
                (Sink::Pipe(slot), ExecMode::Foreground)
            }
            Some(Operator::RedirectOut) => self.parse_redirect_out(env)?,
            Some(Operator::RedirectIn) => unreachable!("`<` is handled inside the segment"),
        };

        if !matches!(stdout, Sink::Pipe(_)) {
            self.next_slot = PipeSlot::A;
        }

        Ok(Stage::Segment(PipelineSegment {
            path,
            argv,
            io: IoPlan { stdin, stdout },
            mode,
        }))
    }

    /// After the first `>`: an optional second `>` for append, the file name,
    /// then an optional `&` or `;`.
    fn parse_redirect_out(&mut self, env: &Environment) -> Result<(Sink, ExecMode), ParseError> {
        let mode = if self.consume_if(Operator::RedirectOut) {
            if self.consume_if(Operator::RedirectOut) {
                return Err(ParseError::UnexpectedOperator(Operator::RedirectOut));
            }
            WriteMode::Append
        } else {
            WriteMode::Overwrite
        };
        let path = self.expect_target(Operator::RedirectOut, env)?;

        let exec = if self.consume_if(Operator::Background) {
            ExecMode::Background
        } else {
            self.consume_if(Operator::Separator);
            ExecMode::Foreground
        };
        Ok((Sink::File { path, mode }, exec))
    }
}
