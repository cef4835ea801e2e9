//! Source text to token stream.
//!
//! An unterminated string or an unrecognized character reports a
//! [`Category::LexicalError`](crate::diagnostics::Category::LexicalError) and
//! keeps scanning so the rest of the file still yields tokens.

use crate::diagnostics::{Category, DiagnosticSink};
use crate::token::{Token, TokenKind, KEYWORDS};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self, sink: &mut DiagnosticSink) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(sink);
            let done = tok.kind == TokenKind::Eoi;
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, sink: &mut DiagnosticSink) -> Token {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.peek() else {
            return Token::eoi(line);
        };

        if c.is_ascii_digit() {
            return self.number(line);
        }
        if c == b'_' || c.is_ascii_alphabetic() {
            return self.identifier_or_keyword(line);
        }
        if c == b'"' {
            return self.string(sink, line);
        }
        if c == b'\'' {
            return self.char_literal(sink, line);
        }

        self.advance();
        let (kind, text): (TokenKind, &str) = match c {
            b'(' => (TokenKind::Lp, "("),
            b')' => (TokenKind::Rp, ")"),
            b'{' => (TokenKind::Lc, "{"),
            b'}' => (TokenKind::Rc, "}"),
            b'[' => (TokenKind::Lb, "["),
            b']' => (TokenKind::Rb, "]"),
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.advance();
                    (TokenKind::Range, "..")
                } else {
                    (TokenKind::Period, ".")
                }
            }
            b',' => (TokenKind::Coma, ","),
            b';' => (TokenKind::Semi, ";"),
            b':' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    (TokenKind::Assign, ":=")
                } else {
                    (TokenKind::Colon, ":")
                }
            }
            b'?' => (TokenKind::Question, "?"),
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.advance();
                    (TokenKind::Or, "||")
                } else {
                    (TokenKind::Pipe, "|")
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.advance();
                    (TokenKind::And, "&&")
                } else {
                    (TokenKind::Amp, "&")
                }
            }
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.advance();
                    (TokenKind::Inc, "++")
                } else {
                    (TokenKind::Add, "+")
                }
            }
            b'-' => {
                if self.peek() == Some(b'-') {
                    self.advance();
                    (TokenKind::Dec, "--")
                } else if self.peek() == Some(b'>') {
                    self.advance();
                    (TokenKind::Arrow, "->")
                } else {
                    (TokenKind::Sub, "-")
                }
            }
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.advance();
                    (TokenKind::Pow, "**")
                } else {
                    (TokenKind::Mul, "*")
                }
            }
            b'/' => (TokenKind::Div, "/"),
            b'%' => (TokenKind::Mod, "%"),
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    (TokenKind::Lte, "<=")
                } else {
                    (TokenKind::Lt, "<")
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    (TokenKind::Gte, ">=")
                } else {
                    (TokenKind::Gt, ">")
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    (TokenKind::Equ, "==")
                } else {
                    sink.report(Category::LexicalError, "unexpected character '='", line);
                    (TokenKind::Err, "=")
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    (TokenKind::Neq, "!=")
                } else {
                    (TokenKind::Not, "!")
                }
            }
            other => {
                sink.report(
                    Category::LexicalError,
                    format!("unknown character '{}'", other as char),
                    line,
                );
                (TokenKind::Err, "")
            }
        };
        Token::new(kind, text, line)
    }

    fn number(&mut self, line: u32) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_real = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        Token::new(if is_real { TokenKind::Real } else { TokenKind::Num }, text, line)
    }

    fn identifier_or_keyword(&mut self, line: u32) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        let kind = KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == text)
            .map(|(_, k)| *k)
            .unwrap_or(TokenKind::Id);
        Token::new(kind, text, line)
    }

    fn string(&mut self, sink: &mut DiagnosticSink, line: u32) -> Token {
        self.advance();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    sink.report(Category::LexicalError, "unterminated string literal", line);
                    return Token::new(TokenKind::Err, text, line);
                }
                Some(b'"') => {
                    self.advance();
                    return Token::new(TokenKind::Str, text, line);
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => text.push('\n'),
                        Some(b't') => text.push('\t'),
                        Some(b'"') => text.push('"'),
                        Some(b'\\') => text.push('\\'),
                        Some(other) => text.push(other as char),
                        None => {
                            sink.report(Category::LexicalError, "unterminated string literal", line);
                            return Token::new(TokenKind::Err, text, line);
                        }
                    }
                }
                Some(c) => {
                    text.push(c as char);
                    self.advance();
                }
            }
        }
    }

    fn char_literal(&mut self, sink: &mut DiagnosticSink, line: u32) -> Token {
        self.advance();
        let c = match self.advance() {
            Some(c) => c as char,
            None => {
                sink.report(Category::LexicalError, "unterminated char literal", line);
                return Token::new(TokenKind::Err, "", line);
            }
        };
        if self.peek() == Some(b'\'') {
            self.advance();
        } else {
            sink.report(Category::LexicalError, "unterminated char literal", line);
        }
        Token::new(TokenKind::Char, c.to_string(), line)
    }
}
