//! SQL parser producing the query AST
//!
//! The planner only consumes [`ast::Query`]; this module is how the CLI and
//! the tests obtain one from SQL text. [`display`] renders an AST back to SQL
//! for the local engine.

pub mod ast;
pub mod display;
pub mod keywords;
pub mod parser;
pub mod tokenizer;

pub use ast::*;
pub use keywords::*;
pub use parser::*;
pub use tokenizer::*;

use crate::common::error::FederationResult;

/// Main parser interface
pub struct SqlParser {
    tokenizer: Tokenizer,
}

impl SqlParser {
    /// Create a new SQL parser
    pub fn new() -> Self {
        Self {
            tokenizer: Tokenizer::new(),
        }
    }

    /// Parse a SQL query string
    pub fn parse(&self, sql: &str) -> FederationResult<Query> {
        let tokens = self.tokenizer.tokenize(sql)?;
        let mut parser = Parser::new(tokens);
        parser.parse_statement()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a single SELECT query (convenience function)
pub fn parse_query(sql: &str) -> FederationResult<Query> {
    SqlParser::new().parse(sql)
}
