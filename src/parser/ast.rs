//! Abstract Syntax Tree (AST) for planned queries
//!
//! Defines the structure of a parsed SELECT query. Every node is an immutable
//! value: planning never edits a query in place, it builds rewritten copies.

use crate::planner::plan::StepId;
use crate::types::Value;
use serde::Serialize;

/// SELECT query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    /// Named sub-queries (WITH clause), in definition order
    pub cte: Option<Vec<CommonTableExpression>>,
    pub distinct: bool,
    pub targets: Vec<Target>,
    pub from: Option<TableReference>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpression>,
    pub limit: Option<usize>,
}

impl Query {
    /// Create a query with the given targets and nothing else
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            cte: None,
            distinct: false,
            targets,
            from: None,
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// `SELECT * FROM <from>`
    pub fn select_all(from: TableReference) -> Self {
        let mut query = Self::new(vec![Target::new(Expression::Star { table: None })]);
        query.from = Some(from);
        query
    }

    /// Whether this query or any query nested inside it still carries a WITH clause
    pub fn has_cte_binding(&self) -> bool {
        if self.cte.is_some() {
            return true;
        }
        let mut found = false;
        crate::planner::traversal::for_each_nested_query(self, &mut |q| {
            if q.cte.is_some() {
                found = true;
            }
        });
        found
    }

    /// Output aliases declared in the target list
    pub fn target_aliases(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter_map(|t| t.alias.as_deref())
            .collect()
    }
}

/// Common Table Expression (CTE)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonTableExpression {
    pub name: String,
    pub query: Box<Query>,
}

/// SELECT list item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl Target {
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// A bare column reference or `*`: something a fetch-only source can serve
    pub fn is_plain(&self) -> bool {
        matches!(
            self.expr,
            Expression::Identifier(_) | Expression::Star { .. }
        )
    }

    /// Column name this target produces in the output relation
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => alias.clone(),
            (None, Expression::Identifier(column)) => column.name.clone(),
            (None, expr) => expr.to_string(),
        }
    }
}

/// ORDER BY expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderByExpression {
    pub expression: Expression,
    pub ascending: bool,
}

/// Table reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableReference {
    /// A table registered in the source registry
    NamedTable {
        source: Option<String>,
        table: String,
        alias: Option<String>,
    },
    Join {
        left: Box<TableReference>,
        right: Box<TableReference>,
        join_type: JoinType,
        condition: Option<Expression>,
    },
    /// Derived table: `(SELECT ...) AS alias`
    Subquery { query: Box<Query>, alias: String },
    /// Output relation of an already planned step
    Materialized(MaterializedRelation),
}

impl TableReference {
    pub fn named(source: Option<&str>, table: &str, alias: Option<&str>) -> Self {
        TableReference::NamedTable {
            source: source.map(str::to_string),
            table: table.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    /// Name columns of this reference are qualified with
    pub fn binding_name(&self) -> Option<&str> {
        match self {
            TableReference::NamedTable { table, alias, .. } => {
                Some(alias.as_deref().unwrap_or(table))
            }
            TableReference::Subquery { alias, .. } => Some(alias),
            TableReference::Materialized(m) => Some(&m.alias),
            TableReference::Join { .. } => None,
        }
    }

    /// Relation name the local engine knows a named table by
    pub fn local_relation_name(source: Option<&str>, table: &str) -> String {
        match source {
            Some(source) => format!("{}__{}", source, table),
            None => table.to_string(),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, TableReference::Join { .. })
    }
}

/// Reference to the relation produced by a planned step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedRelation {
    pub step: StepId,
    pub relation: String,
    pub columns: Vec<String>,
    pub alias: String,
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// Column reference, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

/// Expression AST
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    Identifier(ColumnRef),
    Constant(LiteralValue),
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    /// Searched CASE; simple CASE is desugared by the parser
    CaseExpr {
        branches: Vec<(Expression, Expression)>,
        default: Option<Box<Expression>>,
    },
    TypeCast {
        operand: Box<Expression>,
        data_type: String,
    },
    Star {
        table: Option<String>,
    },
    Subquery(Box<Query>),
    /// Parenthesized value list, the right side of IN
    List(Vec<Expression>),
}

impl Expression {
    pub fn column(name: &str) -> Self {
        Expression::Identifier(ColumnRef {
            table: None,
            name: name.to_string(),
        })
    }

    pub fn qualified_column(table: &str, name: &str) -> Self {
        Expression::Identifier(ColumnRef {
            table: Some(table.to_string()),
            name: name.to_string(),
        })
    }

    pub fn literal(value: LiteralValue) -> Self {
        Expression::Constant(value)
    }

    pub fn string(value: &str) -> Self {
        Expression::Constant(LiteralValue::String(value.to_string()))
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn function(name: &str, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.to_string(),
            args,
            distinct: false,
        }
    }

    /// `expr IS NULL` / `expr IS NOT NULL`
    pub fn is_null(operand: Expression, negated: bool) -> Self {
        let op = if negated {
            BinaryOperator::IsNot
        } else {
            BinaryOperator::Is
        };
        Expression::binary(operand, op, Expression::Constant(LiteralValue::Null))
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expression::Identifier(column) => Some(column),
            _ => None,
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl LiteralValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LiteralValue::Null)
    }

    /// Runtime value carried to a source on the wire
    pub fn to_value(&self) -> Value {
        match self {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(v) => Value::Boolean(*v),
            LiteralValue::Integer(v) => Value::BigInt(*v),
            LiteralValue::Float(v) => Value::Double(*v),
            LiteralValue::String(v) => Value::Varchar(v.clone()),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,

    // Comparison
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,

    // String
    Like,
    NotLike,

    // Other
    In,
    NotIn,
    Is,
    IsNot,
}

impl BinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::In => "IN",
            BinaryOperator::NotIn => "NOT IN",
            BinaryOperator::Is => "IS",
            BinaryOperator::IsNot => "IS NOT",
        }
    }

    /// Mirror of the operator when its operands are swapped (`1 < a` is `a > 1`)
    pub fn flipped(&self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::Equals => Some(BinaryOperator::Equals),
            BinaryOperator::NotEquals => Some(BinaryOperator::NotEquals),
            BinaryOperator::LessThan => Some(BinaryOperator::GreaterThan),
            BinaryOperator::LessThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
            BinaryOperator::GreaterThan => Some(BinaryOperator::LessThan),
            BinaryOperator::GreaterThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
            _ => None,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOperator {
    Plus,
    Minus,
    Not,
    Exists,
}
