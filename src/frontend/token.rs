/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

use crate::Opcode;
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    /// `load` or `store`.
    MemOp,
    LoadI,
    /// `add`, `sub`, `mult`, `lshift` or `rshift`.
    ArithOp,
    Output,
    Nop,
    Const,
    Reg,
    Comma,
    /// `=>`
    Into,
    Newline,
    EndFile,
}

impl TokenCategory {
    pub fn name(self) -> &'static str {
        match self {
            TokenCategory::MemOp => "MEMOP",
            TokenCategory::LoadI => "LOADI",
            TokenCategory::ArithOp => "ARITHOP",
            TokenCategory::Output => "OUTPUT",
            TokenCategory::Nop => "NOP",
            TokenCategory::Const => "CONST",
            TokenCategory::Reg => "REG",
            TokenCategory::Comma => "COMMA",
            TokenCategory::Into => "INTO",
            TokenCategory::Newline => "NEWLINE",
            TokenCategory::EndFile => "ENDFILE",
        }
    }
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub category: TokenCategory,
    /// The operation named by an opcode token.
    pub opcode: Option<Opcode>,
    /// Register number of a `Reg`, value of a `Const`; zero otherwise.
    pub value: u32,
    pub line: u32,
}

impl Token {
    pub fn new(category: TokenCategory, line: u32) -> Self {
        Token {
            category,
            opcode: None,
            value: 0,
            line,
        }
    }

    pub fn op(category: TokenCategory, opcode: Opcode, line: u32) -> Self {
        Token {
            opcode: Some(opcode),
            ..Token::new(category, line)
        }
    }

    pub fn with_value(category: TokenCategory, value: u32, line: u32) -> Self {
        Token {
            value,
            ..Token::new(category, line)
        }
    }

    /// The text this token stands for, as printed in token dumps.
    pub fn lexeme(&self) -> String {
        match self.category {
            TokenCategory::Reg => format!("r{}", self.value),
            TokenCategory::Const => self.value.to_string(),
            TokenCategory::Comma => ",".to_string(),
            TokenCategory::Into => "=>".to_string(),
            TokenCategory::Newline => "\\n".to_string(),
            TokenCategory::EndFile => String::new(),
            _ => self
                .opcode
                .map_or_else(String::new, |op| op.mnemonic().to_string()),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: < {}, \"{}\" >", self.line, self.category, self.lexeme())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let tok = Token::op(TokenCategory::MemOp, Opcode::Store, 3);
        assert_eq!(tok.to_string(), "3: < MEMOP, \"store\" >");
        let tok = Token::with_value(TokenCategory::Reg, 12, 1);
        assert_eq!(tok.to_string(), "1: < REG, \"r12\" >");
        let tok = Token::new(TokenCategory::Newline, 1);
        assert_eq!(tok.to_string(), "1: < NEWLINE, \"\\n\" >");
        let tok = Token::new(TokenCategory::EndFile, 2);
        assert_eq!(tok.to_string(), "2: < ENDFILE, \"\" >");
    }
}
