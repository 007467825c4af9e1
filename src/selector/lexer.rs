//! Selector tokenizer

use compact_str::CompactString;

use super::CompileError;

/// Reserved words, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    And,
    Or,
    Not,
    Between,
    In,
    Like,
    Escape,
    Is,
    Null,
    True,
    False,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        const KEYWORDS: [(&str, Keyword); 11] = [
            ("and", Keyword::And),
            ("or", Keyword::Or),
            ("not", Keyword::Not),
            ("between", Keyword::Between),
            ("in", Keyword::In),
            ("like", Keyword::Like),
            ("escape", Keyword::Escape),
            ("is", Keyword::Is),
            ("null", Keyword::Null),
            ("true", Keyword::True),
            ("false", Keyword::False),
        ];
        KEYWORDS
            .iter()
            .find(|(name, _)| word.eq_ignore_ascii_case(name))
            .map(|(_, kw)| *kw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(CompactString),
    Ident(CompactString),
    Keyword(Keyword),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the selector text
    pub position: usize,
}

pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Tokenize the whole input; the last token is always `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.text[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: start,
            });
        };

        let kind = match c {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            ',' => self.single(TokenKind::Comma),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '=' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                }
                TokenKind::Eq
            }
            '!' => {
                self.bump();
                if self.bump() != Some('=') {
                    return Err(CompileError::at("expected '=' after '!'", start));
                }
                TokenKind::NotEq
            }
            '<' => {
                self.bump();
                match self.peek() {
                    Some('=') => self.single(TokenKind::LtEq),
                    Some('>') => self.single(TokenKind::NotEq),
                    _ => TokenKind::Lt,
                }
            }
            '>' => {
                self.bump();
                match self.peek() {
                    Some('=') => self.single(TokenKind::GtEq),
                    _ => TokenKind::Gt,
                }
            }
            '\'' => self.string(start)?,
            c if c.is_ascii_digit() => self.number(start)?,
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.number(start)?,
            c if is_identifier_start(c) => self.word(),
            c => {
                return Err(CompileError::at(
                    format!("unexpected character '{}'", c),
                    start,
                ))
            }
        };

        Ok(Token {
            kind,
            position: start,
        })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    /// `'...'` with `''` as an embedded quote
    fn string(&mut self, start: usize) -> Result<TokenKind, CompileError> {
        self.bump();
        let mut out = CompactString::default();
        loop {
            match self.bump() {
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    out.push('\'');
                }
                Some('\'') => return Ok(TokenKind::Str(out)),
                Some(c) => out.push(c),
                None => return Err(CompileError::at("unterminated string literal", start)),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, CompileError> {
        if self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.text[digits_start..self.pos];
            if self.peek().is_some_and(|c| c == 'l' || c == 'L') {
                self.bump();
            }
            self.reject_trailing_identifier(start)?;
            return i64::from_str_radix(digits, 16)
                .map(TokenKind::Int)
                .map_err(|_| CompileError::at("invalid hexadecimal literal", start));
        }

        let mut is_float = false;
        self.digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_ok = match self.peek_second() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => {
                    let rest = &self.text[self.pos + 2..];
                    rest.starts_with(|c: char| c.is_ascii_digit())
                }
                _ => false,
            };
            if !exponent_ok {
                return Err(CompileError::at("malformed exponent", start));
            }
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            self.digits();
        }
        let literal = &self.text[start..self.pos];

        let kind = match self.peek() {
            Some('l' | 'L') if !is_float => {
                self.bump();
                integer_literal(literal)
            }
            Some('d' | 'D' | 'f' | 'F') => {
                self.bump();
                float_literal(literal, start)?
            }
            _ if is_float => float_literal(literal, start)?,
            _ => integer_literal(literal),
        };
        self.reject_trailing_identifier(start)?;
        Ok(kind)
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn reject_trailing_identifier(&self, start: usize) -> Result<(), CompileError> {
        match self.peek() {
            Some(c) if is_identifier_part(c) => {
                Err(CompileError::at("invalid numeric literal", start))
            }
            _ => Ok(()),
        }
    }

    /// Identifier or keyword. Identifiers may carry dotted paths and `[n]` indexes.
    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_identifier_part(c) || c == '.' {
                self.bump();
            } else if c == '[' && self.index_follows() {
                while self.bump() != Some(']') {}
            } else {
                break;
            }
        }
        let word = &self.text[start..self.pos];
        match Keyword::from_word(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(word.into()),
        }
    }

    /// `[digits]` at the cursor
    fn index_follows(&self) -> bool {
        let rest = &self.text[self.pos + 1..];
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        digits > 0 && rest[digits..].starts_with(']')
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Integer literal; values outside the i64 range become floats
fn integer_literal(literal: &str) -> TokenKind {
    match literal.parse::<i64>() {
        Ok(i) => TokenKind::Int(i),
        Err(_) => TokenKind::Float(literal.parse::<f64>().unwrap_or(f64::INFINITY)),
    }
}

fn float_literal(literal: &str, start: usize) -> Result<TokenKind, CompileError> {
    literal
        .parse::<f64>()
        .map(TokenKind::Float)
        .map_err(|_| CompileError::at("invalid numeric literal", start))
}
