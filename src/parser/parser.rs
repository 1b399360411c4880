//! SQL Parser
//!
//! Parses tokens into a [`Query`] AST. Only SELECT queries (with an optional
//! WITH clause) are accepted; the planner has nothing to do with anything else.

use crate::common::error::{FederationError, FederationResult};
use crate::parser::ast::*;
use crate::parser::keywords::Keyword;
use crate::parser::tokenizer::{Token, TokenType};

/// SQL parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a new parser with the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse a single query, allowing trailing semicolons
    pub fn parse_statement(&mut self) -> FederationResult<Query> {
        let query = self.parse_query()?;

        while self.consume_token(&TokenType::Semicolon).is_ok() {}

        if !self.current_token().is_eof() {
            return Err(self.unexpected("end of statement"));
        }

        Ok(query)
    }

    /// Parse `[WITH ...] SELECT ...`
    fn parse_query(&mut self) -> FederationResult<Query> {
        let cte = if self.consume_keyword(Keyword::With).is_ok() {
            if self.consume_keyword(Keyword::Recursive).is_ok() {
                return Err(crate::not_implemented_err!("WITH RECURSIVE"));
            }
            Some(self.parse_with_clause()?)
        } else {
            None
        };

        let mut query = self.parse_select_statement()?;
        query.cte = cte;

        for keyword in [Keyword::Union, Keyword::Intersect, Keyword::Except] {
            if self.current_token().is_keyword(keyword) {
                return Err(crate::not_implemented_err!("set operation {}", keyword));
            }
        }
        Ok(query)
    }

    /// Parse WITH clause (Common Table Expressions)
    fn parse_with_clause(&mut self) -> FederationResult<Vec<CommonTableExpression>> {
        let mut ctes = Vec::new();

        loop {
            let name = self.consume_identifier()?;
            if ctes
                .iter()
                .any(|c: &CommonTableExpression| c.name.eq_ignore_ascii_case(&name))
            {
                return Err(FederationError::Parse(format!(
                    "WITH query name '{}' specified more than once",
                    name
                )));
            }

            self.consume_keyword(Keyword::As)?;
            self.consume_token(&TokenType::LeftParen)?;
            let query = Box::new(self.parse_query()?);
            self.consume_token(&TokenType::RightParen)?;

            ctes.push(CommonTableExpression { name, query });

            if self.consume_token(&TokenType::Comma).is_err() {
                break;
            }
        }

        Ok(ctes)
    }

    /// Parse SELECT statement
    fn parse_select_statement(&mut self) -> FederationResult<Query> {
        self.consume_keyword(Keyword::Select)?;

        let distinct = if self.consume_keyword(Keyword::Distinct).is_ok() {
            true
        } else {
            let _ = self.consume_keyword(Keyword::All);
            false
        };

        let mut query = Query::new(self.parse_select_list()?);
        query.distinct = distinct;

        if self.consume_keyword(Keyword::From).is_ok() {
            query.from = Some(self.parse_table_reference()?);
        }

        if self.consume_keyword(Keyword::Where).is_ok() {
            query.where_clause = Some(self.parse_expression()?);
        }

        if self.consume_keyword(Keyword::Group).is_ok() {
            self.consume_keyword(Keyword::By)?;
            query.group_by = self.parse_expression_list()?;
        }

        if self.consume_keyword(Keyword::Having).is_ok() {
            query.having = Some(self.parse_expression()?);
        }

        if self.consume_keyword(Keyword::Order).is_ok() {
            self.consume_keyword(Keyword::By)?;
            query.order_by = self.parse_order_by_list()?;
        }

        if self.consume_keyword(Keyword::Limit).is_ok() {
            query.limit = Some(self.parse_literal_integer()?);
        }

        Ok(query)
    }

    /// Parse SELECT list
    fn parse_select_list(&mut self) -> FederationResult<Vec<Target>> {
        let mut targets = Vec::new();

        loop {
            let expr = self.parse_expression()?;
            let alias = self.parse_optional_alias()?;
            targets.push(Target { expr, alias });

            if self.consume_token(&TokenType::Comma).is_err() {
                break;
            }
        }

        Ok(targets)
    }

    /// `AS name` or a bare identifier following an item
    fn parse_optional_alias(&mut self) -> FederationResult<Option<String>> {
        if self.consume_keyword(Keyword::As).is_ok() {
            return Ok(Some(self.consume_identifier()?));
        }
        match self.current_token().token_type {
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) => {
                Ok(Some(self.consume_identifier()?))
            }
            _ => Ok(None),
        }
    }

    /// Parse table reference (FROM clause), folding joins left-deep
    fn parse_table_reference(&mut self) -> FederationResult<TableReference> {
        let mut left = self.parse_table_factor()?;

        loop {
            if self.consume_token(&TokenType::Comma).is_ok() {
                let right = self.parse_table_factor()?;
                left = TableReference::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    join_type: JoinType::Cross,
                    condition: None,
                };
            } else if self.is_join_keyword() {
                let join_type = self.parse_join_type()?;
                let right = self.parse_table_factor()?;
                let condition = if join_type == JoinType::Cross {
                    None
                } else {
                    self.consume_keyword(Keyword::On)?;
                    Some(self.parse_expression()?)
                };
                left = TableReference::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    join_type,
                    condition,
                };
            } else {
                break;
            }
        }

        Ok(left)
    }

    /// Parse a single table, `source.table`, or derived table
    fn parse_table_factor(&mut self) -> FederationResult<TableReference> {
        if self.consume_token(&TokenType::LeftParen).is_ok() {
            let query = Box::new(self.parse_query()?);
            self.consume_token(&TokenType::RightParen)?;
            let alias = self.parse_optional_alias()?.ok_or_else(|| {
                FederationError::Parse("Subquery in FROM must have an alias".to_string())
            })?;
            return Ok(TableReference::Subquery { query, alias });
        }

        let first = self.consume_identifier()?;
        let (source, table) = if self.consume_token(&TokenType::Dot).is_ok() {
            (Some(first), self.consume_identifier()?)
        } else {
            (None, first)
        };
        let alias = self.parse_optional_alias()?;

        Ok(TableReference::NamedTable {
            source,
            table,
            alias,
        })
    }

    /// Parse join type up to and including JOIN
    fn parse_join_type(&mut self) -> FederationResult<JoinType> {
        let join_type = if self.consume_keyword(Keyword::Cross).is_ok() {
            JoinType::Cross
        } else if self.consume_keyword(Keyword::Left).is_ok() {
            let _ = self.consume_keyword(Keyword::Outer);
            JoinType::Left
        } else if self.consume_keyword(Keyword::Right).is_ok() {
            let _ = self.consume_keyword(Keyword::Outer);
            JoinType::Right
        } else if self.consume_keyword(Keyword::Full).is_ok() {
            let _ = self.consume_keyword(Keyword::Outer);
            JoinType::Full
        } else {
            let _ = self.consume_keyword(Keyword::Inner);
            JoinType::Inner
        };

        self.consume_keyword(Keyword::Join)?;
        Ok(join_type)
    }

    /// Parse ORDER BY list
    fn parse_order_by_list(&mut self) -> FederationResult<Vec<OrderByExpression>> {
        let mut items = Vec::new();

        loop {
            let expression = self.parse_expression()?;
            let ascending = if self.consume_keyword(Keyword::Desc).is_ok() {
                false
            } else {
                let _ = self.consume_keyword(Keyword::Asc);
                true
            };
            items.push(OrderByExpression {
                expression,
                ascending,
            });

            if self.consume_token(&TokenType::Comma).is_err() {
                break;
            }
        }

        Ok(items)
    }

    fn parse_expression(&mut self) -> FederationResult<Expression> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> FederationResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.consume_keyword(Keyword::Or).is_ok() {
            let right = self.parse_and_expression()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> FederationResult<Expression> {
        let mut left = self.parse_not_expression()?;

        while self.consume_keyword(Keyword::And).is_ok() {
            let right = self.parse_not_expression()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_not_expression(&mut self) -> FederationResult<Expression> {
        if self.consume_keyword(Keyword::Not).is_ok() {
            let operand = self.parse_not_expression()?;
            Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            })
        } else {
            self.parse_comparison_expression()
        }
    }

    /// Comparison, `[NOT] LIKE`, `[NOT] IN`, `[NOT] BETWEEN` and `IS [NOT] NULL`
    fn parse_comparison_expression(&mut self) -> FederationResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        loop {
            let negated = self.current_token().is_keyword(Keyword::Not)
                && matches!(
                    self.peek_token().token_type,
                    TokenType::Keyword(Keyword::Like)
                        | TokenType::Keyword(Keyword::In)
                        | TokenType::Keyword(Keyword::Between)
                );
            if negated {
                self.position += 1;
            }

            let token_type = self.current_token().token_type.clone();
            let op = match token_type {
                TokenType::Equals => BinaryOperator::Equals,
                TokenType::NotEquals => BinaryOperator::NotEquals,
                TokenType::LessThan => BinaryOperator::LessThan,
                TokenType::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenType::GreaterThan => BinaryOperator::GreaterThan,
                TokenType::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                TokenType::Keyword(Keyword::Like) if negated => BinaryOperator::NotLike,
                TokenType::Keyword(Keyword::Like) => BinaryOperator::Like,
                TokenType::Keyword(Keyword::In) => {
                    self.position += 1;
                    left = self.parse_in_expression(left, negated)?;
                    continue;
                }
                TokenType::Keyword(Keyword::Between) => {
                    self.position += 1;
                    left = self.parse_between_expression(left, negated)?;
                    continue;
                }
                TokenType::Keyword(Keyword::Is) => {
                    self.position += 1;
                    left = self.parse_is_expression(left)?;
                    continue;
                }
                _ => break,
            };

            self.position += 1;
            let right = self.parse_additive_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> FederationResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.current_token().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Subtract,
                TokenType::Concat => BinaryOperator::Concat,
                _ => break,
            };
            self.position += 1;
            let right = self.parse_multiplicative_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> FederationResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.current_token().token_type {
                TokenType::Star => BinaryOperator::Multiply,
                TokenType::Divide => BinaryOperator::Divide,
                TokenType::Modulo => BinaryOperator::Modulo,
                _ => break,
            };
            self.position += 1;
            let right = self.parse_unary_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> FederationResult<Expression> {
        let op = match self.current_token().token_type {
            TokenType::Plus => UnaryOperator::Plus,
            TokenType::Minus => UnaryOperator::Minus,
            _ => return self.parse_primary_expression(),
        };
        self.position += 1;
        let operand = self.parse_unary_expression()?;

        // Fold negative numeric literals so `-5` stays a literal
        match (op, operand) {
            (UnaryOperator::Minus, Expression::Constant(LiteralValue::Integer(v))) => {
                Ok(Expression::Constant(LiteralValue::Integer(-v)))
            }
            (UnaryOperator::Minus, Expression::Constant(LiteralValue::Float(v))) => {
                Ok(Expression::Constant(LiteralValue::Float(-v)))
            }
            (op, operand) => Ok(Expression::UnaryOp {
                op,
                operand: Box::new(operand),
            }),
        }
    }

    fn parse_primary_expression(&mut self) -> FederationResult<Expression> {
        let token_type = self.current_token().token_type.clone();
        match token_type {
            TokenType::StringLiteral(value) => {
                self.position += 1;
                Ok(Expression::Constant(LiteralValue::String(value)))
            }
            TokenType::NumericLiteral(text) => {
                self.position += 1;
                self.parse_number(&text).map(Expression::Constant)
            }
            TokenType::Keyword(Keyword::True) => {
                self.position += 1;
                Ok(Expression::Constant(LiteralValue::Boolean(true)))
            }
            TokenType::Keyword(Keyword::False) => {
                self.position += 1;
                Ok(Expression::Constant(LiteralValue::Boolean(false)))
            }
            TokenType::Keyword(Keyword::Null) => {
                self.position += 1;
                Ok(Expression::Constant(LiteralValue::Null))
            }
            TokenType::Keyword(Keyword::Case) => self.parse_case_expression(),
            TokenType::Keyword(Keyword::Cast) => self.parse_cast_expression(),
            TokenType::Keyword(Keyword::Exists) => {
                self.position += 1;
                self.consume_token(&TokenType::LeftParen)?;
                let subquery = Box::new(self.parse_query()?);
                self.consume_token(&TokenType::RightParen)?;
                Ok(Expression::UnaryOp {
                    op: UnaryOperator::Exists,
                    operand: Box::new(Expression::Subquery(subquery)),
                })
            }
            // LEFT(...) / RIGHT(...) string functions
            TokenType::Keyword(Keyword::Left) | TokenType::Keyword(Keyword::Right)
                if self.peek_token().token_type == TokenType::LeftParen =>
            {
                let name = self.current_token().text.clone();
                self.position += 1;
                self.parse_function_call(name)
            }
            TokenType::Star => {
                self.position += 1;
                Ok(Expression::Star { table: None })
            }
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) => {
                let quoted = matches!(token_type, TokenType::QuotedIdentifier(_));
                let identifier = self.consume_identifier()?;

                if !quoted && self.current_token().token_type == TokenType::LeftParen {
                    return self.parse_function_call(identifier);
                }

                if self.consume_token(&TokenType::Dot).is_ok() {
                    if self.consume_token(&TokenType::Star).is_ok() {
                        return Ok(Expression::Star {
                            table: Some(identifier),
                        });
                    }
                    let name = self.consume_identifier()?;
                    return Ok(Expression::Identifier(ColumnRef {
                        table: Some(identifier),
                        name,
                    }));
                }

                Ok(Expression::Identifier(ColumnRef {
                    table: None,
                    name: identifier,
                }))
            }
            TokenType::LeftParen => {
                self.position += 1;

                if self.starts_query() {
                    let subquery = Box::new(self.parse_query()?);
                    self.consume_token(&TokenType::RightParen)?;
                    Ok(Expression::Subquery(subquery))
                } else {
                    let expression = self.parse_expression()?;
                    self.consume_token(&TokenType::RightParen)?;
                    Ok(expression)
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_number(&self, text: &str) -> FederationResult<LiteralValue> {
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .map(LiteralValue::Float)
                .map_err(|_| FederationError::Parse(format!("Invalid number: {}", text)))
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(LiteralValue::Integer(v)),
                // Out of i64 range
                Err(_) => text
                    .parse::<f64>()
                    .map(LiteralValue::Float)
                    .map_err(|_| FederationError::Parse(format!("Invalid number: {}", text))),
            }
        }
    }

    /// Parse function call; `name(` has been seen
    fn parse_function_call(&mut self, name: String) -> FederationResult<Expression> {
        self.consume_token(&TokenType::LeftParen)?;

        let distinct = self.consume_keyword(Keyword::Distinct).is_ok();

        let args = if self.current_token().token_type == TokenType::RightParen {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };

        self.consume_token(&TokenType::RightParen)?;

        Ok(Expression::FunctionCall {
            name,
            args,
            distinct,
        })
    }

    /// Parse CASE expression
    ///
    /// Simple CASE (`CASE x WHEN v THEN r ...`) is rewritten to the searched
    /// form with `x = v` conditions.
    fn parse_case_expression(&mut self) -> FederationResult<Expression> {
        self.consume_keyword(Keyword::Case)?;

        let operand = if self.current_token().is_keyword(Keyword::When) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        let mut branches = Vec::new();
        while self.consume_keyword(Keyword::When).is_ok() {
            let when = self.parse_expression()?;
            self.consume_keyword(Keyword::Then)?;
            let then = self.parse_expression()?;

            let condition = match &operand {
                Some(operand) => Expression::binary(operand.clone(), BinaryOperator::Equals, when),
                None => when,
            };
            branches.push((condition, then));
        }

        if branches.is_empty() {
            return Err(FederationError::Parse(
                "CASE requires at least one WHEN clause".to_string(),
            ));
        }

        let default = if self.consume_keyword(Keyword::Else).is_ok() {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        self.consume_keyword(Keyword::End)?;

        Ok(Expression::CaseExpr { branches, default })
    }

    /// `CAST(expr AS type[(n[, m])])`
    fn parse_cast_expression(&mut self) -> FederationResult<Expression> {
        self.consume_keyword(Keyword::Cast)?;
        self.consume_token(&TokenType::LeftParen)?;
        let operand = self.parse_expression()?;
        self.consume_keyword(Keyword::As)?;

        let mut data_type = self.consume_identifier()?.to_uppercase();
        while let TokenType::Identifier(word) = &self.current_token().token_type {
            // Multi-word types such as DOUBLE PRECISION
            data_type.push(' ');
            data_type.push_str(&word.to_uppercase());
            self.position += 1;
        }
        if self.consume_token(&TokenType::LeftParen).is_ok() {
            let mut params = vec![self.parse_literal_integer()?.to_string()];
            while self.consume_token(&TokenType::Comma).is_ok() {
                params.push(self.parse_literal_integer()?.to_string());
            }
            self.consume_token(&TokenType::RightParen)?;
            data_type = format!("{}({})", data_type, params.join(", "));
        }

        self.consume_token(&TokenType::RightParen)?;

        Ok(Expression::TypeCast {
            operand: Box::new(operand),
            data_type,
        })
    }

    /// `IN (list)` or `IN (subquery)`; `IN` has been consumed
    fn parse_in_expression(
        &mut self,
        left: Expression,
        negated: bool,
    ) -> FederationResult<Expression> {
        self.consume_token(&TokenType::LeftParen)
            .map_err(|_| FederationError::Parse("Expected '(' after IN".to_string()))?;

        let right = if self.starts_query() {
            Expression::Subquery(Box::new(self.parse_query()?))
        } else {
            Expression::List(self.parse_expression_list()?)
        };
        self.consume_token(&TokenType::RightParen)?;

        let op = if negated {
            BinaryOperator::NotIn
        } else {
            BinaryOperator::In
        };
        Ok(Expression::binary(left, op, right))
    }

    /// `x BETWEEN lo AND hi` becomes `x >= lo AND x <= hi`
    fn parse_between_expression(
        &mut self,
        left: Expression,
        negated: bool,
    ) -> FederationResult<Expression> {
        let low = self.parse_additive_expression()?;
        self.consume_keyword(Keyword::And)?;
        let high = self.parse_additive_expression()?;

        let range = Expression::binary(
            Expression::binary(left.clone(), BinaryOperator::GreaterThanOrEqual, low),
            BinaryOperator::And,
            Expression::binary(left, BinaryOperator::LessThanOrEqual, high),
        );

        if negated {
            Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(range),
            })
        } else {
            Ok(range)
        }
    }

    /// `IS [NOT] NULL`; `IS` has been consumed
    fn parse_is_expression(&mut self, left: Expression) -> FederationResult<Expression> {
        let negated = self.consume_keyword(Keyword::Not).is_ok();
        self.consume_keyword(Keyword::Null).map_err(|_| {
            let expected = if negated { "IS NOT" } else { "IS" };
            FederationError::Parse(format!("Expected NULL after {}", expected))
        })?;
        Ok(Expression::is_null(left, negated))
    }

    fn parse_expression_list(&mut self) -> FederationResult<Vec<Expression>> {
        let mut expressions = Vec::new();

        loop {
            expressions.push(self.parse_expression()?);
            if self.consume_token(&TokenType::Comma).is_err() {
                break;
            }
        }

        Ok(expressions)
    }

    // Helper methods

    fn current_token(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)]
    }

    fn starts_query(&self) -> bool {
        matches!(
            self.current_token().token_type,
            TokenType::Keyword(Keyword::Select) | TokenType::Keyword(Keyword::With)
        )
    }

    fn consume_token(&mut self, token_type: &TokenType) -> FederationResult<&Token> {
        if self.current_token().token_type == *token_type {
            let token = &self.tokens[self.position];
            self.position += 1;
            Ok(token)
        } else {
            Err(self.unexpected(&format!("{:?}", token_type)))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> FederationResult<&Token> {
        if self.current_token().is_keyword(keyword) {
            let token = &self.tokens[self.position];
            self.position += 1;
            Ok(token)
        } else {
            Err(self.unexpected(&format!("keyword '{}'", keyword)))
        }
    }

    fn consume_identifier(&mut self) -> FederationResult<String> {
        match &self.current_token().token_type {
            TokenType::Identifier(name) | TokenType::QuotedIdentifier(name) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_literal_integer(&mut self) -> FederationResult<usize> {
        match &self.current_token().token_type {
            TokenType::NumericLiteral(value) => {
                let parsed = value
                    .parse()
                    .map_err(|_| FederationError::Parse(format!("Expected integer, got: {}", value)));
                self.position += 1;
                parsed
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    fn is_join_keyword(&self) -> bool {
        matches!(
            self.current_token().token_type,
            TokenType::Keyword(Keyword::Join)
                | TokenType::Keyword(Keyword::Inner)
                | TokenType::Keyword(Keyword::Left)
                | TokenType::Keyword(Keyword::Right)
                | TokenType::Keyword(Keyword::Full)
                | TokenType::Keyword(Keyword::Cross)
        )
    }

    fn unexpected(&self, expected: &str) -> FederationError {
        let token = self.current_token();
        let found = match &token.token_type {
            TokenType::EOF => "end of input".to_string(),
            TokenType::Keyword(k) => k.to_string(),
            TokenType::Identifier(s) | TokenType::NumericLiteral(s) => s.clone(),
            TokenType::QuotedIdentifier(s) => format!("\"{}\"", s),
            TokenType::StringLiteral(s) => format!("'{}'", s),
            other => format!("{:?}", other),
        };
        FederationError::Parse(format!(
            "Expected {}, found {} at line {}, column {}",
            expected, found, token.line, token.column
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::Tokenizer;

    fn parse(sql: &str) -> Query {
        let tokens = Tokenizer::new().tokenize(sql).unwrap();
        Parser::new(tokens).parse_statement().unwrap()
    }

    fn parse_err(sql: &str) -> FederationError {
        let tokens = Tokenizer::new().tokenize(sql).unwrap();
        Parser::new(tokens).parse_statement().unwrap_err()
    }

    #[test]
    fn test_between_is_desugared() {
        let query = parse("SELECT a FROM t WHERE a BETWEEN 1 AND 5 AND b = 2");
        let expected = Expression::binary(
            Expression::binary(
                Expression::binary(
                    Expression::column("a"),
                    BinaryOperator::GreaterThanOrEqual,
                    Expression::literal(LiteralValue::Integer(1)),
                ),
                BinaryOperator::And,
                Expression::binary(
                    Expression::column("a"),
                    BinaryOperator::LessThanOrEqual,
                    Expression::literal(LiteralValue::Integer(5)),
                ),
            ),
            BinaryOperator::And,
            Expression::binary(
                Expression::column("b"),
                BinaryOperator::Equals,
                Expression::literal(LiteralValue::Integer(2)),
            ),
        );
        assert_eq!(query.where_clause, Some(expected));
    }

    #[test]
    fn test_not_like_and_not_in() {
        let query = parse("SELECT a FROM t WHERE a NOT LIKE 'x%' AND b NOT IN (1, 2)");
        let Some(Expression::BinaryOp { left, right, .. }) = query.where_clause else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expression::BinaryOp { op: BinaryOperator::NotLike, .. }));
        assert!(matches!(*right, Expression::BinaryOp { op: BinaryOperator::NotIn, .. }));
    }

    #[test]
    fn test_simple_case_becomes_searched() {
        let query = parse("SELECT CASE a WHEN 1 THEN 'one' ELSE 'other' END AS label FROM t");
        let Expression::CaseExpr { branches, default } = &query.targets[0].expr else {
            panic!("expected CASE");
        };
        assert_eq!(
            branches[0].0,
            Expression::binary(
                Expression::column("a"),
                BinaryOperator::Equals,
                Expression::literal(LiteralValue::Integer(1))
            )
        );
        assert_eq!(default.as_deref(), Some(&Expression::string("other")));
        assert_eq!(query.targets[0].alias.as_deref(), Some("label"));
    }

    #[test]
    fn test_negative_literal_folded() {
        let query = parse("SELECT a FROM t WHERE a > -3");
        assert_eq!(
            query.where_clause,
            Some(Expression::binary(
                Expression::column("a"),
                BinaryOperator::GreaterThan,
                Expression::literal(LiteralValue::Integer(-3))
            ))
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_err("SELECT FROM t"), FederationError::Parse(_)));
        assert!(matches!(
            parse_err("SELECT a FROM (SELECT a FROM t)"),
            FederationError::Parse(_)
        ));
        assert!(matches!(
            parse_err("WITH x AS (SELECT 1), x AS (SELECT 2) SELECT * FROM x"),
            FederationError::Parse(_)
        ));
        assert!(matches!(
            parse_err("WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r"),
            FederationError::NotImplemented(_)
        ));
        assert!(matches!(
            parse_err("SELECT a FROM t UNION SELECT a FROM u"),
            FederationError::NotImplemented(_)
        ));
        let err = parse_err("SELECT a FROM t WHERE a IS 3");
        assert_eq!(err.to_string(), "Parse error: Expected NULL after IS");
    }
}
