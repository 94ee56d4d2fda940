/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! ILOC front end: scanner and recursive-descent parser.
//!
//! One operation per line. Errors are reported per line; the scanner and
//! the parser both skip to the end of the offending line and carry on,
//! so a single pass reports every bad line.

use core::fmt;

mod parser;
mod scanner;
mod token;

pub use parser::{parse, Parser};
pub use scanner::Scanner;
pub use token::{Token, TokenCategory};

/// Which stage rejected the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
}

/// One diagnostic, tied to a source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn lexical(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line,
            kind: ErrorKind::Lexical,
            message: message.into(),
        }
    }

    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line,
            kind: ErrorKind::Syntax,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::Lexical => write!(f, "ERROR {}: {}", self.line, self.message),
            ErrorKind::Syntax => write!(f, "ERROR {}:\t{}", self.line, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Every diagnostic found in one input, in source order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
}

impl ParseErrors {
    pub(crate) fn new(errors: Vec<ParseError>) -> Self {
        debug_assert!(!errors.is_empty());
        ParseErrors { errors }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.errors {
            writeln!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}
