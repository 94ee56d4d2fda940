/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Scanner for ILOC source text.
//!
//! Words are read whole and then classified, so `loadI` and `load` or
//! `r7` and `rshift` never need lookahead. A lexical error is recorded,
//! the rest of its line is skipped, and a `Newline` token stands in for
//! it so the parser can resynchronize.

use super::token::{Token, TokenCategory};
use super::ParseError;
use crate::Opcode;

pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    /// The previous token ended a line; a missing final newline is
    /// synthesized otherwise.
    at_line_start: bool,
    done: bool,
    errors: Vec<ParseError>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src,
            pos: 0,
            line: 1,
            at_line_start: false,
            done: false,
            errors: vec![],
        }
    }

    /// Lexical errors found since the last call.
    pub fn take_errors(&mut self) -> Vec<ParseError> {
        core::mem::take(&mut self.errors)
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_to_eol(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Ends the current line, consuming its `\n` if there is one.
    fn newline(&mut self) -> Token {
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        let tok = Token::new(TokenCategory::Newline, self.line);
        self.line += 1;
        tok
    }

    fn error(&mut self, message: String) -> Token {
        trace!("lexical error on line {}: {}", self.line, message);
        self.errors.push(ParseError::lexical(self.line, message));
        self.skip_to_eol();
        self.newline()
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek().map_or(false, &pred) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }

    /// Parses a run of decimal digits, rejecting values that do not fit
    /// in a `u32`.
    fn number(digits: &str) -> Option<u32> {
        digits
            .bytes()
            .try_fold(0u32, |acc, d| acc.checked_mul(10)?.checked_add(u32::from(d - b'0')))
    }

    fn word(&mut self) -> Token {
        let line = self.line;
        let word = self.take_while(|b| b.is_ascii_alphanumeric());
        let op = |category, opcode| Token::op(category, opcode, line);
        match word {
            "load" => op(TokenCategory::MemOp, Opcode::Load),
            "store" => op(TokenCategory::MemOp, Opcode::Store),
            "loadI" => op(TokenCategory::LoadI, Opcode::LoadI),
            "add" => op(TokenCategory::ArithOp, Opcode::Add),
            "sub" => op(TokenCategory::ArithOp, Opcode::Sub),
            "mult" => op(TokenCategory::ArithOp, Opcode::Mult),
            "lshift" => op(TokenCategory::ArithOp, Opcode::LShift),
            "rshift" => op(TokenCategory::ArithOp, Opcode::RShift),
            "output" => op(TokenCategory::Output, Opcode::Output),
            "nop" => op(TokenCategory::Nop, Opcode::Nop),
            _ if word.starts_with('r') => {
                let digits = &word[1..];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return self.error(format!("'r' not followed by digits or 'shift' in '{}'", word));
                }
                match Self::number(digits) {
                    Some(reg) if reg < u32::MAX => Token::with_value(TokenCategory::Reg, reg, line),
                    _ => self.error(format!("register number too large in '{}'", word)),
                }
            }
            _ => self.error(format!("invalid token '{}'", word)),
        }
    }

    pub fn next_token(&mut self) -> Token {
        let tok = self.scan();
        self.at_line_start = tok.category == TokenCategory::Newline;
        tok
    }

    fn scan(&mut self) -> Token {
        loop {
            self.take_while(|b| b == b' ' || b == b'\t' || b == b'\r');
            let line = self.line;
            let b = match self.peek() {
                Some(b) => b,
                None if self.at_line_start => {
                    return Token::new(TokenCategory::EndFile, line);
                }
                None => return self.newline(),
            };
            return match b {
                b'\n' => self.newline(),
                b'/' if self.peek_at(1) == Some(b'/') => {
                    self.skip_to_eol();
                    continue;
                }
                b'/' => self.error("stray '/'".to_string()),
                b',' => {
                    self.pos += 1;
                    Token::new(TokenCategory::Comma, line)
                }
                b'=' if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    Token::new(TokenCategory::Into, line)
                }
                b'=' => self.error("'=' not followed by '>'".to_string()),
                b'0'..=b'9' => {
                    let digits = self.take_while(|b| b.is_ascii_digit());
                    match Self::number(digits) {
                        Some(value) => Token::with_value(TokenCategory::Const, value, line),
                        None => self.error(format!("constant {} is too large", digits)),
                    }
                }
                b if b.is_ascii_alphabetic() => self.word(),
                _ => {
                    let bad = self.src[self.pos..].chars().next().unwrap_or('?');
                    self.error(format!("invalid char '{}'", bad))
                }
            };
        }
    }
}

/// Yields every token up to and including `EndFile`.
impl<'a> Iterator for Scanner<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let tok = self.next_token();
        self.done = tok.category == TokenCategory::EndFile;
        Some(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(src: &str) -> Vec<TokenCategory> {
        Scanner::new(src).map(|tok| tok.category).collect()
    }

    #[test]
    fn operations() {
        use TokenCategory::*;
        assert_eq!(
            categories("loadI 12 => r3\nadd r1,r2=>r3\n"),
            vec![LoadI, Const, Into, Reg, Newline, ArithOp, Reg, Comma, Reg, Into, Reg, Newline, EndFile]
        );
        let toks: Vec<Token> = Scanner::new("rshift r10 => r0").collect();
        assert_eq!(toks[0].opcode, Some(Opcode::RShift));
        assert_eq!(toks[1].value, 10);
        assert_eq!(toks[3].value, 0);
    }

    #[test]
    fn comments_and_blank_lines() {
        use TokenCategory::*;
        assert_eq!(
            categories("// header\n\n  nop // trailing\noutput 4"),
            vec![Newline, Newline, Nop, Newline, Output, Const, Newline, EndFile]
        );
    }

    #[test]
    fn line_numbers() {
        let toks: Vec<Token> = Scanner::new("nop\n\nstore r1 => r2\n").collect();
        let store = toks.iter().find(|t| t.category == TokenCategory::MemOp).unwrap();
        assert_eq!(store.line, 3);
        assert_eq!(toks.last().unwrap().line, 4);
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            categories(""),
            vec![TokenCategory::Newline, TokenCategory::EndFile]
        );
    }

    #[test]
    fn errors_skip_the_line() {
        let mut scanner = Scanner::new("loadI 1 => r1 % junk\nnop\nload r1 = r2\nfoo\n");
        let toks: Vec<Token> = scanner.by_ref().collect();
        let errors = scanner.take_errors();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].message, "invalid char '%'");
        assert_eq!(errors[1].line, 3);
        assert_eq!(errors[1].message, "'=' not followed by '>'");
        assert_eq!(errors[2].message, "invalid token 'foo'");
        // The `nop` on line 2 survives.
        assert!(toks.iter().any(|t| t.category == TokenCategory::Nop && t.line == 2));
        assert!(scanner.take_errors().is_empty());
    }

    #[test]
    fn out_of_range_numbers() {
        let mut scanner = Scanner::new("loadI 4294967296 => r1\nloadI 4294967295 => r4294967295\n");
        let toks: Vec<Token> = scanner.by_ref().collect();
        let errors = scanner.take_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].line, 2);
        assert!(toks
            .iter()
            .any(|t| t.category == TokenCategory::Const && t.value == u32::MAX));
    }

    #[test]
    fn bad_register() {
        let mut scanner = Scanner::new("load rx => r1\n");
        let _: Vec<Token> = scanner.by_ref().collect();
        assert_eq!(scanner.take_errors().len(), 1);
    }
}
