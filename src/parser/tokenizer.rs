//! SQL Tokenizer
//!
//! Breaks SQL strings into individual tokens for parsing.

use crate::common::error::{FederationError, FederationResult};
use crate::parser::keywords::Keyword;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// SQL token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Literals
    Identifier(String),
    /// Double-quoted identifier; never a keyword
    QuotedIdentifier(String),
    StringLiteral(String),
    NumericLiteral(String),

    Keyword(Keyword),

    // Operators
    Plus,               // +
    Minus,              // -
    Divide,             // /
    Modulo,             // %
    Concat,             // ||
    Equals,             // =
    NotEquals,          // != or <>
    LessThan,           // <
    GreaterThan,        // >
    LessThanOrEqual,    // <=
    GreaterThanOrEqual, // >=

    // Punctuation
    LeftParen,  // (
    RightParen, // )
    Comma,      // ,
    Dot,        // .
    Semicolon,  // ;

    Star, // *
    EOF,
}

/// SQL token with position information
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, text: String, line: usize, column: usize) -> Self {
        Self {
            token_type,
            text,
            line,
            column,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.token_type, TokenType::EOF)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.token_type, TokenType::Keyword(k) if k == keyword)
    }
}

/// Position cursor over the input
struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            result.push(ch);
            self.bump();
        }
        result
    }
}

/// SQL tokenizer
pub struct Tokenizer {
    keywords: HashMap<String, Keyword>,
}

impl Tokenizer {
    pub fn new() -> Self {
        let keywords = Keyword::all()
            .iter()
            .map(|k| (k.as_str().to_string(), *k))
            .collect();
        Self { keywords }
    }

    /// Tokenize a SQL string into tokens
    pub fn tokenize(&self, sql: &str) -> FederationResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut cursor = Cursor {
            chars: sql.chars().peekable(),
            line: 1,
            column: 1,
        };

        while let Some(ch) = cursor.peek() {
            if ch.is_whitespace() {
                cursor.bump();
                continue;
            }

            let (line, column) = (cursor.line, cursor.column);
            let token_type = match ch {
                '\'' => TokenType::StringLiteral(self.consume_quoted(&mut cursor, '\'')?),
                '"' => TokenType::QuotedIdentifier(self.consume_quoted(&mut cursor, '"')?),
                '0'..='9' => TokenType::NumericLiteral(self.consume_number(&mut cursor)),
                '-' => {
                    cursor.bump();
                    if cursor.bump_if('-') {
                        // Line comment
                        cursor.take_while(|c| c != '\n');
                        continue;
                    }
                    TokenType::Minus
                }
                '|' => {
                    cursor.bump();
                    if !cursor.bump_if('|') {
                        return Err(self.error("Unexpected '|' character", line, column));
                    }
                    TokenType::Concat
                }
                '!' => {
                    cursor.bump();
                    if !cursor.bump_if('=') {
                        return Err(self.error("Unexpected '!' character", line, column));
                    }
                    TokenType::NotEquals
                }
                '<' => {
                    cursor.bump();
                    if cursor.bump_if('=') {
                        TokenType::LessThanOrEqual
                    } else if cursor.bump_if('>') {
                        TokenType::NotEquals
                    } else {
                        TokenType::LessThan
                    }
                }
                '>' => {
                    cursor.bump();
                    if cursor.bump_if('=') {
                        TokenType::GreaterThanOrEqual
                    } else {
                        TokenType::GreaterThan
                    }
                }
                _ if is_identifier_start(ch) => {
                    let text = cursor.take_while(is_identifier_char);
                    match self.keywords.get(&text.to_uppercase()) {
                        Some(&keyword) => {
                            tokens.push(Token::new(TokenType::Keyword(keyword), text, line, column));
                            continue;
                        }
                        None => TokenType::Identifier(text),
                    }
                }
                _ => {
                    let single = match ch {
                        '(' => TokenType::LeftParen,
                        ')' => TokenType::RightParen,
                        ',' => TokenType::Comma,
                        '.' => TokenType::Dot,
                        ';' => TokenType::Semicolon,
                        '*' => TokenType::Star,
                        '+' => TokenType::Plus,
                        '/' => TokenType::Divide,
                        '%' => TokenType::Modulo,
                        '=' => TokenType::Equals,
                        _ => {
                            return Err(self.error(
                                &format!("Unexpected character: {}", ch),
                                line,
                                column,
                            ))
                        }
                    };
                    cursor.bump();
                    single
                }
            };

            tokens.push(Token::new(token_type, String::new(), line, column));
        }

        tokens.push(Token::new(
            TokenType::EOF,
            String::new(),
            cursor.line,
            cursor.column,
        ));

        Ok(tokens)
    }

    /// Quoted text; a doubled quote character stands for itself
    fn consume_quoted(&self, cursor: &mut Cursor, quote: char) -> FederationResult<String> {
        let (line, column) = (cursor.line, cursor.column);
        cursor.bump();

        let mut result = String::new();
        loop {
            match cursor.bump() {
                Some(ch) if ch == quote => {
                    if cursor.bump_if(quote) {
                        result.push(quote);
                    } else {
                        return Ok(result);
                    }
                }
                Some(ch) => result.push(ch),
                None => {
                    let what = if quote == '\'' {
                        "string literal"
                    } else {
                        "quoted identifier"
                    };
                    return Err(self.error(&format!("Unterminated {}", what), line, column));
                }
            }
        }
    }

    fn consume_number(&self, cursor: &mut Cursor) -> String {
        let mut result = cursor.take_while(|c| c.is_ascii_digit());

        if cursor.peek() == Some('.') {
            cursor.bump();
            result.push('.');
            result.push_str(&cursor.take_while(|c| c.is_ascii_digit()));
        }

        if let Some(e @ ('e' | 'E')) = cursor.peek() {
            cursor.bump();
            result.push(e);
            if let Some(sign @ ('+' | '-')) = cursor.peek() {
                cursor.bump();
                result.push(sign);
            }
            result.push_str(&cursor.take_while(|c| c.is_ascii_digit()));
        }

        result
    }

    fn error(&self, message: &str, line: usize, column: usize) -> FederationError {
        FederationError::Parse(format!("{} at line {}, column {}", message, line, column))
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}
