//! Lexical analysis (tokenization) of a single command line.

use std::fmt;
use thiserror::Error;

/// A single-character operator recognised by the lexer.
///
/// Multi-character operators such as `>>` are never produced here: the lexer
/// emits two [`Operator::RedirectOut`] tokens and the parser composes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `&`: run the preceding segment in the background.
    Background,
    /// `|`: connect the preceding segment's stdout to the next one's stdin.
    Pipe,
    /// `>`: redirect stdout to a file.
    RedirectOut,
    /// `<`: read stdin from a file.
    RedirectIn,
    /// `;`: end the current pipeline.
    Separator,
}

impl Operator {
    fn from_char(ch: char) -> Option<Self> {
        match ch {
            '&' => Some(Operator::Background),
            '|' => Some(Operator::Pipe),
            '>' => Some(Operator::RedirectOut),
            '<' => Some(Operator::RedirectIn),
            ';' => Some(Operator::Separator),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Operator::Background => '&',
            Operator::Pipe => '|',
            Operator::RedirectOut => '>',
            Operator::RedirectIn => '<',
            Operator::Separator => ';',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal word, with any surrounding double quotes already removed.
    Word(String),
    /// One of the shell operators.
    Operator(Operator),
}

impl Token {
    pub fn word(s: impl Into<String>) -> Self {
        Token::Word(s.into())
    }
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing double quote was not found.
    #[error("syntax error: unterminated quote")]
    UnfinishedQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingDoubleQuote,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    /// Runs the machine over the whole line.
    ///
    /// A word is open from its first character (or opening quote) until the
    /// next whitespace or operator outside of quotes, so `""` still yields an
    /// empty word and `a"b c"d` yields the single word `ab cd`.
    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        match self.state {
            LexingState::ReadingDoubleQuote => return Err(LexingError::UnfinishedQuote),
            LexingState::ReadingWord => self.finish_word(&mut out),
            LexingState::Start => {}
        }

        Ok(out)
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {}
            '"' => self.state = LexingState::ReadingDoubleQuote,
            c => match Operator::from_char(c) {
                Some(op) => out.push(Token::Operator(op)),
                None => {
                    self.buffer.push(c);
                    self.state = LexingState::ReadingWord;
                }
            },
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '"' => self.state = LexingState::ReadingDoubleQuote,
            c => match Operator::from_char(c) {
                Some(op) => {
                    self.finish_word(out);
                    out.push(Token::Operator(op));
                    self.state = LexingState::Start;
                }
                None => self.buffer.push(c),
            },
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        out.push(Token::Word(std::mem::take(&mut self.buffer)));
    }
}

/// Splits a command line into words and operators.
///
/// Whitespace separates words and is otherwise dropped. Each of `&`, `|`,
/// `>`, `<` and `;` always forms its own token. An empty or blank line yields
/// an empty vector.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
