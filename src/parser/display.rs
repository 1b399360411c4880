//! SQL rendering of the AST
//!
//! Produces SQL the local engine (SQLite) accepts: identifiers are double
//! quoted, strings single quoted, nested binary operations parenthesized.

use crate::common::helper::{quote_identifier, quote_string};
use crate::parser::ast::*;
use std::fmt;

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "NULL"),
            LiteralValue::Boolean(true) => write!(f, "TRUE"),
            LiteralValue::Boolean(false) => write!(f, "FALSE"),
            LiteralValue::Integer(v) => write!(f, "{}", v),
            LiteralValue::Float(v) => write!(f, "{:?}", v),
            LiteralValue::String(v) => write!(f, "{}", quote_string(v)),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", quote_identifier(table), quote_identifier(&self.name)),
            None => write!(f, "{}", quote_identifier(&self.name)),
        }
    }
}

/// Render an operand, parenthesizing compound expressions
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    match expr {
        Expression::BinaryOp { .. } | Expression::UnaryOp { .. } => {
            write!(f, "({})", expr)
        }
        _ => write!(f, "{}", expr),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(column) => write!(f, "{}", column),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::UnaryOp { op, operand } => {
                match op {
                    UnaryOperator::Plus => write!(f, "+")?,
                    UnaryOperator::Minus => write!(f, "-")?,
                    UnaryOperator::Not => write!(f, "NOT ")?,
                    UnaryOperator::Exists => write!(f, "EXISTS ")?,
                }
                write_operand(f, operand)
            }
            Expression::BinaryOp { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.as_sql())?;
                write_operand(f, right)
            }
            Expression::FunctionCall {
                name,
                args,
                distinct,
            } => {
                write!(f, "{}(", name)?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                write_list(f, args)?;
                write!(f, ")")
            }
            Expression::CaseExpr { branches, default } => {
                write!(f, "CASE")?;
                for (condition, result) in branches {
                    write!(f, " WHEN {} THEN {}", condition, result)?;
                }
                if let Some(default) = default {
                    write!(f, " ELSE {}", default)?;
                }
                write!(f, " END")
            }
            Expression::TypeCast { operand, data_type } => {
                write!(f, "CAST({} AS {})", operand, data_type)
            }
            Expression::Star { table: None } => write!(f, "*"),
            Expression::Star { table: Some(t) } => write!(f, "{}.*", quote_identifier(t)),
            Expression::Subquery(query) => write!(f, "({})", query),
            Expression::List(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_identifier(alias))?;
        }
        Ok(())
    }
}

impl fmt::Display for OrderByExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        write!(f, "{} {}", self.expression, direction)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        };
        f.write_str(text)
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableReference::NamedTable {
                source,
                table,
                alias,
            } => {
                let relation = TableReference::local_relation_name(source.as_deref(), table);
                write!(f, "{}", quote_identifier(&relation))?;
                if source.is_some() || alias.is_some() {
                    let alias = alias.as_deref().unwrap_or(table);
                    write!(f, " AS {}", quote_identifier(alias))?;
                }
                Ok(())
            }
            TableReference::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                match condition {
                    None => write!(f, "{} CROSS JOIN ", left)?,
                    Some(_) => write!(f, "{} {} ", left, join_type)?,
                }
                if right.is_join() {
                    write!(f, "({})", right)?;
                } else {
                    write!(f, "{}", right)?;
                }
                if let Some(condition) = condition {
                    write!(f, " ON {}", condition)?;
                }
                Ok(())
            }
            TableReference::Subquery { query, alias } => {
                write!(f, "({}) AS {}", query, quote_identifier(alias))
            }
            TableReference::Materialized(m) => write!(
                f,
                "{} AS {}",
                quote_identifier(&m.relation),
                quote_identifier(&m.alias)
            ),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctes) = &self.cte {
            write!(f, "WITH ")?;
            for (i, cte) in ctes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} AS ({})", quote_identifier(&cte.name), cte.query)?;
            }
            write!(f, " ")?;
        }

        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write_list(f, &self.targets)?;

        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_query;

    fn roundtrip(sql: &str) -> String {
        parse_query(sql).unwrap().to_string()
    }

    #[test]
    fn test_render_select() {
        assert_eq!(
            roundtrip("select a, b as bee from crm.deals d where d.x = 'it''s' and y > 1.5 order by a desc limit 3"),
            "SELECT \"a\", \"b\" AS \"bee\" FROM \"crm__deals\" AS \"d\" WHERE (\"d\".\"x\" = 'it''s') AND (\"y\" > 1.5) ORDER BY \"a\" DESC LIMIT 3"
        );
    }

    #[test]
    fn test_render_join_and_functions() {
        assert_eq!(
            roundtrip("SELECT COUNT(DISTINCT t1.id), CAST(x AS varchar(10)) FROM t1 LEFT JOIN t2 ON t1.id = t2.id, t3"),
            "SELECT COUNT(DISTINCT \"t1\".\"id\"), CAST(\"x\" AS VARCHAR(10)) FROM \"t1\" LEFT JOIN \"t2\" ON \"t1\".\"id\" = \"t2\".\"id\" CROSS JOIN \"t3\""
        );
    }

    #[test]
    fn test_render_reparses_to_same_ast() {
        let sql = "SELECT CASE WHEN a IS NOT NULL THEN a || 'x' ELSE NULL END FROM t WHERE b IN (1, 2) AND NOT EXISTS (SELECT 1 FROM u)";
        let first = parse_query(sql).unwrap();
        let second = parse_query(&first.to_string()).unwrap();
        assert_eq!(first.targets, second.targets);
        assert_eq!(first.where_clause, second.where_clause);
    }
}
