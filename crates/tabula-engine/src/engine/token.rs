//! Formula text -> token stream.
//!
//! The lexer stays context-free: an identifier run is captured first and only
//! then classified as a cell, a range, a function name, a boolean or a bare
//! name. Whether a bare name means anything is decided at evaluation time.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use super::error::FormulaError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Amp,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Caret => "^",
            Operator::Amp => "&",
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Bool(bool),
    /// Cell-shaped identifier, possibly sheet-qualified and `$`-anchored.
    Cell,
    /// Two cell-shaped identifiers joined by `:`.
    Range,
    /// Identifier immediately followed by `(`.
    Function,
    /// Anything else; resolved (or rejected) during evaluation.
    Ident,
    Operator(Operator),
    LParen,
    RParen,
    Comma,
    Eof,
}

/// A token with the exact source text it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end of formula"),
            _ => write!(f, "'{}'", self.text),
        }
    }
}

fn cell_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$?[A-Za-z]+\$?[0-9]+$").expect("cell shape regex must compile")
    })
}

/// True if the text (after any `Sheet!` prefix) looks like `A1`/`$A$1`.
pub fn is_cell_shaped(text: &str) -> bool {
    let local = match text.rfind('!') {
        Some(i) => &text[i + 1..],
        None => text,
    };
    cell_shape_re().is_match(local)
}

/// Tokenize formula text (without the leading `=`). The stream always ends
/// with an `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.source.len(), |(i, _)| *i)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let end = self.offset();
        self.tokens.push(Token {
            kind,
            text: self.source[start..end].to_string(),
            offset: start,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, FormulaError> {
        while let Some(ch) = self.peek() {
            let start = self.offset();
            match ch {
                c if c.is_whitespace() => self.pos += 1,
                '0'..='9' => self.number(start)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(start)?,
                '"' => self.string(start)?,
                '(' => self.single(TokenKind::LParen, start),
                ')' => self.single(TokenKind::RParen, start),
                ',' => self.single(TokenKind::Comma, start),
                '+' => self.single(TokenKind::Operator(Operator::Plus), start),
                '-' => self.single(TokenKind::Operator(Operator::Minus), start),
                '*' => self.single(TokenKind::Operator(Operator::Star), start),
                '/' => self.single(TokenKind::Operator(Operator::Slash), start),
                '^' => self.single(TokenKind::Operator(Operator::Caret), start),
                '&' => self.single(TokenKind::Operator(Operator::Amp), start),
                '=' => self.single(TokenKind::Operator(Operator::Eq), start),
                '<' => {
                    self.pos += 1;
                    let op = match self.peek() {
                        Some('=') => {
                            self.pos += 1;
                            Operator::Le
                        }
                        Some('>') => {
                            self.pos += 1;
                            Operator::Ne
                        }
                        _ => Operator::Lt,
                    };
                    self.push(TokenKind::Operator(op), start);
                }
                '>' => {
                    self.pos += 1;
                    let op = if self.peek() == Some('=') {
                        self.pos += 1;
                        Operator::Ge
                    } else {
                        Operator::Gt
                    };
                    self.push(TokenKind::Operator(op), start);
                }
                c if c.is_alphabetic() || c == '_' || c == '$' || c == '\'' => {
                    self.identifier(start)?
                }
                other => {
                    return Err(FormulaError::UnexpectedChar {
                        ch: other,
                        offset: start,
                    });
                }
            }
        }

        let end = self.source.len();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            offset: end,
        });
        Ok(self.tokens)
    }

    fn single(&mut self, kind: TokenKind, start: usize) {
        self.pos += 1;
        self.push(kind, start);
    }

    fn eat_digits(&mut self) -> usize {
        let mut n = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            n += 1;
        }
        n
    }

    fn number(&mut self, start: usize) -> Result<(), FormulaError> {
        self.eat_digits();
        if self.peek() == Some('.') {
            self.pos += 1;
            self.eat_digits();
        }
        if self.peek() == Some('.') {
            return Err(FormulaError::UnexpectedChar {
                ch: '.',
                offset: self.offset(),
            });
        }
        // Exponent only when digits actually follow, so `1E` stays an error.
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                self.eat_digits();
            }
        }
        let text = &self.source[start..self.offset()];
        // Digits with at most one '.' always parse; `1e400` overflows.
        let value = text.parse::<f64>().unwrap_or(f64::NAN);
        if !value.is_finite() {
            return Err(FormulaError::NumberOutOfRange { offset: start });
        }
        self.push(TokenKind::Number(value), start);
        Ok(())
    }

    fn string(&mut self, start: usize) -> Result<(), FormulaError> {
        self.pos += 1;
        let mut literal = String::new();
        loop {
            match self.peek() {
                None => return Err(FormulaError::UnterminatedString { offset: start }),
                Some('"') if self.peek_at(1) == Some('"') => {
                    literal.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }
        self.push(TokenKind::Str(literal), start);
        Ok(())
    }

    fn is_ident_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
    }

    /// Consume one identifier run, including an optional `Sheet!` prefix.
    /// Returns the byte range of the run.
    fn identifier_run(&mut self) -> Result<(usize, usize), FormulaError> {
        let start = self.offset();
        if self.peek() == Some('\'') {
            self.pos += 1;
            loop {
                match self.peek() {
                    None => return Err(FormulaError::UnterminatedString { offset: start }),
                    Some('\'') if self.peek_at(1) == Some('\'') => self.pos += 2,
                    Some('\'') => {
                        self.pos += 1;
                        break;
                    }
                    Some(_) => self.pos += 1,
                }
            }
            if self.peek() != Some('!') {
                return Err(match self.peek() {
                    Some(ch) => FormulaError::UnexpectedChar {
                        ch,
                        offset: self.offset(),
                    },
                    None => FormulaError::UnexpectedEnd {
                        offset: self.offset(),
                    },
                });
            }
        }
        while self.peek().is_some_and(Self::is_ident_char) {
            self.pos += 1;
        }
        if self.peek() == Some('!') {
            self.pos += 1;
            while self.peek().is_some_and(Self::is_ident_char) {
                self.pos += 1;
            }
        }
        Ok((start, self.offset()))
    }

    fn identifier(&mut self, start: usize) -> Result<(), FormulaError> {
        let (_, end) = self.identifier_run()?;
        let text = &self.source[start..end];

        if is_cell_shaped(text) {
            // `A1:B2` is merged into a single range token.
            if self.peek() == Some(':') {
                let rewind = self.pos;
                self.pos += 1;
                let second_start = self.offset();
                let starts_ident = self
                    .peek()
                    .is_some_and(|c| c.is_alphabetic() || c == '$' || c == '\'');
                if starts_ident {
                    let (_, second_end) = self.identifier_run()?;
                    if is_cell_shaped(&self.source[second_start..second_end]) {
                        self.push(TokenKind::Range, start);
                        return Ok(());
                    }
                }
                self.pos = rewind;
            }
            self.push(TokenKind::Cell, start);
            return Ok(());
        }

        let plain = !text.contains(['!', '$', '\'']);
        if plain && self.peek() == Some('(') {
            self.push(TokenKind::Function, start);
        } else if plain && text.eq_ignore_ascii_case("TRUE") {
            self.push(TokenKind::Bool(true), start);
        } else if plain && text.eq_ignore_ascii_case("FALSE") {
            self.push(TokenKind::Bool(false), start);
        } else {
            self.push(TokenKind::Ident, start);
        }
        Ok(())
    }
}
