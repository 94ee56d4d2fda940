/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Recursive-descent parser: one operation per line.

use super::scanner::Scanner;
use super::token::{Token, TokenCategory};
use super::{ParseError, ParseErrors};
use crate::{Block, InstData, Opcode, SReg};

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    tok: Token,
    block: Block,
    errors: Vec<ParseError>,
}

/// Parses `src` into a block of source-register instructions.
///
/// All lexical and syntax errors are collected; the block is only
/// returned if there were none.
pub fn parse(src: &str) -> Result<Block, ParseErrors> {
    Parser::new(src).parse()
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        let mut scanner = Scanner::new(src);
        let tok = scanner.next_token();
        let errors = scanner.take_errors();
        Parser {
            scanner,
            tok,
            block: Block::new(),
            errors,
        }
    }

    fn advance(&mut self) {
        self.tok = self.scanner.next_token();
        self.errors.extend(self.scanner.take_errors());
    }

    fn at_eol(&self) -> bool {
        matches!(
            self.tok.category,
            TokenCategory::Newline | TokenCategory::EndFile
        )
    }

    /// Skips the rest of the current line, including its `Newline`.
    fn recover(&mut self) {
        while !self.at_eol() {
            self.advance();
        }
        if self.tok.category == TokenCategory::Newline {
            self.advance();
        }
    }

    /// Consumes a token of `category`, returning its value.
    fn expect(&mut self, category: TokenCategory, what: &str, op: Opcode) -> Result<u32, String> {
        if self.tok.category != category {
            return Err(format!("Missing {} in {}.", what, op));
        }
        let value = self.tok.value;
        self.advance();
        Ok(value)
    }

    fn reg(&mut self, what: &str, op: Opcode) -> Result<SReg, String> {
        self.expect(TokenCategory::Reg, what, op).map(SReg::new)
    }

    fn arrow(&mut self, op: Opcode) -> Result<(), String> {
        self.expect(TokenCategory::Into, "'=>'", op).map(|_| ())
    }

    /// Parses the operands following the opcode token.
    fn operation(&mut self, line: u32) -> Result<InstData, String> {
        let op = match self.tok.opcode {
            Some(op) => op,
            None => return Err("Unrecognized operation.".to_string()),
        };
        self.advance();
        match op {
            Opcode::LoadI => {
                let constant = self.expect(TokenCategory::Const, "constant", op)?;
                self.arrow(op)?;
                let dst = self.reg("destination register", op)?;
                Ok(InstData::load_imm(line, constant, dst))
            }
            Opcode::Load => {
                let addr = self.reg("source register", op)?;
                self.arrow(op)?;
                let dst = self.reg("destination register", op)?;
                Ok(InstData::load(line, addr, dst))
            }
            Opcode::Store => {
                let val = self.reg("source register", op)?;
                self.arrow(op)?;
                let addr = self.reg("destination register", op)?;
                Ok(InstData::store(line, val, addr))
            }
            Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::LShift | Opcode::RShift => {
                let lhs = self.reg("first source register", op)?;
                self.expect(TokenCategory::Comma, "comma", op)?;
                let rhs = self.reg("second source register", op)?;
                self.arrow(op)?;
                let dst = self.reg("destination register", op)?;
                Ok(InstData::arith(line, op, lhs, rhs, dst))
            }
            Opcode::Output => {
                let constant = self.expect(TokenCategory::Const, "constant", op)?;
                Ok(InstData::output(line, constant))
            }
            Opcode::Nop => Ok(InstData::nop(line)),
        }
    }

    pub fn parse(mut self) -> Result<Block, ParseErrors> {
        loop {
            while self.tok.category == TokenCategory::Newline {
                self.advance();
            }
            if self.tok.category == TokenCategory::EndFile {
                break;
            }
            let line = self.tok.line;
            let result = self.operation(line).and_then(|data| {
                if self.at_eol() {
                    Ok(data)
                } else {
                    Err(format!("Extra tokens after {}.", data.opcode))
                }
            });
            match result {
                Ok(data) => {
                    self.block.push(data);
                }
                Err(message) => {
                    trace!("syntax error on line {}: {}", line, message);
                    self.errors.push(ParseError::syntax(line, message));
                    self.recover();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(self.block)
        } else {
            Err(ParseErrors::new(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ErrorKind;
    use crate::RegNames;

    fn messages(src: &str) -> Vec<String> {
        parse(src)
            .unwrap_err()
            .errors()
            .iter()
            .map(|err| err.to_string())
            .collect()
    }

    #[test]
    fn all_operations() {
        let src = "\
// every form
loadI 1024 => r1
load r1 => r2
store r2 => r1
add r1, r2 => r3
sub r1, r2 => r3
mult r1, r2 => r3
lshift r1, r2 => r3
rshift r1, r2 => r3
output 1024
nop
";
        let block = parse(src).unwrap();
        assert_eq!(block.len(), 10);
        assert_eq!(block.display(RegNames::Source).to_string(), &src[14..]);
        let lines: Vec<u32> = block.insts().map(|data| data.line).collect();
        assert_eq!(lines, (2..=11).collect::<Vec<u32>>());
    }

    #[test]
    fn empty_and_comment_only() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("// nothing here\n\n").unwrap().is_empty());
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(messages("loadI => r1\n"), vec!["ERROR 1:\tMissing constant in loadI."]);
        assert_eq!(messages("add r1 r2 => r3\n"), vec!["ERROR 1:\tMissing comma in add."]);
        assert_eq!(messages("mult r1, r2 r3\n"), vec!["ERROR 1:\tMissing '=>' in mult."]);
        assert_eq!(messages("load => r2\n"), vec!["ERROR 1:\tMissing source register in load."]);
        assert_eq!(
            messages("store r1 =>\n"),
            vec!["ERROR 1:\tMissing destination register in store."]
        );
        assert_eq!(messages("output r1\n"), vec!["ERROR 1:\tMissing constant in output."]);
        assert_eq!(messages("r1 => r2\n"), vec!["ERROR 1:\tUnrecognized operation."]);
        assert_eq!(messages("nop nop\n"), vec!["ERROR 1:\tExtra tokens after nop."]);
    }

    #[test]
    fn recovers_at_each_line() {
        let src = "\
loadI 1 => r1
sub r1, => r2
nop
loadI 3 =>
output 5
";
        let errors = parse(src).unwrap_err();
        let lines: Vec<u32> = errors.errors().iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 4]);
        assert!(errors.errors().iter().all(|e| e.kind == ErrorKind::Syntax));
    }

    #[test]
    fn lexical_errors_are_reported() {
        let errors = parse("nop\nloadI 7 => r1 ; bad\n").unwrap_err();
        assert_eq!(errors.errors().len(), 1);
        let err = &errors.errors()[0];
        assert_eq!(err.kind, ErrorKind::Lexical);
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), "ERROR 2: invalid char ';'");
    }

    #[test]
    fn lexical_error_mid_operation() {
        // The scanner drops the rest of the line, so the parser also sees
        // an incomplete `add`.
        let errors = parse("add r1, # => r2\n").unwrap_err();
        let kinds: Vec<ErrorKind> = errors.errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::Lexical, ErrorKind::Syntax]);
        assert_eq!(
            errors.errors()[1].message,
            "Missing second source register in add."
        );
    }
}
