//! AST traversal
//!
//! A pre-order walker over expressions, table references and nested queries,
//! plus the rewriting walk used to substitute planned relations into a query.
//!
//! Every reachable node is visited exactly once. Nested queries (expression
//! subqueries, derived tables and WITH definitions) are bracketed by
//! [`AstVisitor::enter_subquery`] / [`AstVisitor::exit_subquery`] so a visitor
//! can tell outer-scope nodes from nested ones.

use crate::common::error::FederationResult;
use crate::parser::ast::*;

/// Callbacks invoked by the walker. Every hook defaults to a no-op.
pub trait AstVisitor {
    fn visit_expression(&mut self, _expr: &Expression) {}
    fn visit_table_reference(&mut self, _table: &TableReference) {}
    fn enter_subquery(&mut self, _query: &Query) {}
    fn exit_subquery(&mut self, _query: &Query) {}
}

/// Nodes the walker can start from
pub trait Traversable {
    fn walk(&self, visitor: &mut dyn AstVisitor);
}

/// Walk `node` pre-order; a missing node is a no-op
pub fn traverse<T: Traversable + ?Sized>(node: Option<&T>, visitor: &mut dyn AstVisitor) {
    if let Some(node) = node {
        node.walk(visitor);
    }
}

impl Traversable for Expression {
    fn walk(&self, visitor: &mut dyn AstVisitor) {
        visitor.visit_expression(self);
        match self {
            Expression::Identifier(_) | Expression::Constant(_) | Expression::Star { .. } => {}
            Expression::UnaryOp { operand, .. } => operand.walk(visitor),
            Expression::BinaryOp { left, right, .. } => {
                left.walk(visitor);
                right.walk(visitor);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk(visitor);
                }
            }
            Expression::CaseExpr { branches, default } => {
                for (condition, result) in branches {
                    condition.walk(visitor);
                    result.walk(visitor);
                }
                traverse(default.as_deref(), visitor);
            }
            Expression::TypeCast { operand, .. } => operand.walk(visitor),
            Expression::Subquery(query) => walk_nested(query, visitor),
            Expression::List(items) => {
                for item in items {
                    item.walk(visitor);
                }
            }
        }
    }
}

impl Traversable for TableReference {
    fn walk(&self, visitor: &mut dyn AstVisitor) {
        visitor.visit_table_reference(self);
        match self {
            TableReference::NamedTable { .. } | TableReference::Materialized(_) => {}
            TableReference::Join {
                left,
                right,
                condition,
                ..
            } => {
                left.walk(visitor);
                right.walk(visitor);
                traverse(condition.as_ref(), visitor);
            }
            TableReference::Subquery { query, .. } => walk_nested(query, visitor),
        }
    }
}

/// Walks the query's own clauses in the current scope
impl Traversable for Query {
    fn walk(&self, visitor: &mut dyn AstVisitor) {
        for cte in self.cte.iter().flatten() {
            walk_nested(&cte.query, visitor);
        }
        for target in &self.targets {
            target.expr.walk(visitor);
        }
        traverse(self.from.as_ref(), visitor);
        traverse(self.where_clause.as_ref(), visitor);
        for expr in &self.group_by {
            expr.walk(visitor);
        }
        traverse(self.having.as_ref(), visitor);
        for item in &self.order_by {
            item.expression.walk(visitor);
        }
    }
}

fn walk_nested(query: &Query, visitor: &mut dyn AstVisitor) {
    visitor.enter_subquery(query);
    query.walk(visitor);
    visitor.exit_subquery(query);
}

/// Collects outer-scope column references, in first-seen order
#[derive(Default)]
struct ColumnCollector {
    depth: usize,
    columns: Vec<ColumnRef>,
}

impl AstVisitor for ColumnCollector {
    fn visit_expression(&mut self, expr: &Expression) {
        if self.depth == 0 {
            if let Expression::Identifier(column) = expr {
                if !self.columns.contains(column) {
                    self.columns.push(column.clone());
                }
            }
        }
    }

    fn enter_subquery(&mut self, _query: &Query) {
        self.depth += 1;
    }

    fn exit_subquery(&mut self, _query: &Query) {
        self.depth -= 1;
    }
}

/// Column references of `expr`, excluding those inside nested queries
pub fn referenced_columns(expr: &Expression) -> Vec<ColumnRef> {
    let mut collector = ColumnCollector::default();
    expr.walk(&mut collector);
    collector.columns
}

/// Whether an OR appears anywhere in `expr` outside nested queries
pub fn contains_or(expr: &Expression) -> bool {
    struct OrFinder {
        depth: usize,
        found: bool,
    }

    impl AstVisitor for OrFinder {
        fn visit_expression(&mut self, expr: &Expression) {
            if self.depth == 0
                && matches!(
                    expr,
                    Expression::BinaryOp {
                        op: BinaryOperator::Or,
                        ..
                    }
                )
            {
                self.found = true;
            }
        }

        fn enter_subquery(&mut self, _query: &Query) {
            self.depth += 1;
        }

        fn exit_subquery(&mut self, _query: &Query) {
            self.depth -= 1;
        }
    }

    let mut finder = OrFinder {
        depth: 0,
        found: false,
    };
    expr.walk(&mut finder);
    finder.found
}

/// Flatten top-level ANDs into their conjuncts, left to right
pub fn split_conjuncts(expr: &Expression) -> Vec<Expression> {
    let mut conjuncts = Vec::new();
    collect_conjuncts(expr, &mut conjuncts);
    conjuncts
}

fn collect_conjuncts(expr: &Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::BinaryOp {
            op: BinaryOperator::And,
            left,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

/// Rebuild a left-deep AND chain; `None` when there is nothing to combine
pub fn combine_conjuncts(conjuncts: Vec<Expression>) -> Option<Expression> {
    conjuncts
        .into_iter()
        .reduce(|acc, next| Expression::binary(acc, BinaryOperator::And, next))
}

/// Call `f` on every query nested anywhere inside `query` (not `query` itself)
pub fn for_each_nested_query(query: &Query, f: &mut dyn FnMut(&Query)) {
    struct Nested<'a> {
        f: &'a mut dyn FnMut(&Query),
    }

    impl AstVisitor for Nested<'_> {
        fn enter_subquery(&mut self, query: &Query) {
            (self.f)(query);
        }
    }

    query.walk(&mut Nested { f });
}

/// Step outputs a query reads, in first-seen order and including nested queries
pub fn materialized_inputs(query: &Query) -> Vec<MaterializedRelation> {
    #[derive(Default)]
    struct Inputs(Vec<MaterializedRelation>);

    impl AstVisitor for Inputs {
        fn visit_table_reference(&mut self, table: &TableReference) {
            if let TableReference::Materialized(m) = table {
                if !self.0.iter().any(|seen| seen.step == m.step) {
                    self.0.push(m.clone());
                }
            }
        }
    }

    let mut inputs = Inputs::default();
    query.walk(&mut inputs);
    inputs.0
}

/// Rewriting callbacks for [`transform_query`].
///
/// Returning `Some` replaces the node and skips its children; `None`
/// descends into it. Nested queries are only reached through these hooks,
/// so a rewriter that leaves subqueries alone never changes another scope.
pub trait AstRewriter {
    fn rewrite_table_reference(
        &mut self,
        _table: &TableReference,
    ) -> FederationResult<Option<TableReference>> {
        Ok(None)
    }

    fn rewrite_expression(&mut self, _expr: &Expression) -> FederationResult<Option<Expression>> {
        Ok(None)
    }
}

/// Produce a rewritten copy of `query`'s own clauses (WITH is carried over untouched)
pub fn transform_query(query: &Query, rewriter: &mut dyn AstRewriter) -> FederationResult<Query> {
    let targets = query
        .targets
        .iter()
        .map(|t| {
            Ok(Target {
                expr: transform_expression(&t.expr, rewriter)?,
                alias: t.alias.clone(),
            })
        })
        .collect::<FederationResult<Vec<_>>>()?;

    let from = query
        .from
        .as_ref()
        .map(|t| transform_table_reference(t, rewriter))
        .transpose()?;
    let where_clause = transform_optional(query.where_clause.as_ref(), rewriter)?;
    let group_by = transform_all(&query.group_by, rewriter)?;
    let having = transform_optional(query.having.as_ref(), rewriter)?;
    let order_by = query
        .order_by
        .iter()
        .map(|o| {
            Ok(OrderByExpression {
                expression: transform_expression(&o.expression, rewriter)?,
                ascending: o.ascending,
            })
        })
        .collect::<FederationResult<Vec<_>>>()?;

    Ok(Query {
        cte: query.cte.clone(),
        distinct: query.distinct,
        targets,
        from,
        where_clause,
        group_by,
        having,
        order_by,
        limit: query.limit,
    })
}

pub fn transform_table_reference(
    table: &TableReference,
    rewriter: &mut dyn AstRewriter,
) -> FederationResult<TableReference> {
    if let Some(replacement) = rewriter.rewrite_table_reference(table)? {
        return Ok(replacement);
    }
    match table {
        TableReference::Join {
            left,
            right,
            join_type,
            condition,
        } => Ok(TableReference::Join {
            left: Box::new(transform_table_reference(left, rewriter)?),
            right: Box::new(transform_table_reference(right, rewriter)?),
            join_type: *join_type,
            condition: transform_optional(condition.as_ref(), rewriter)?,
        }),
        other => Ok(other.clone()),
    }
}

pub fn transform_expression(
    expr: &Expression,
    rewriter: &mut dyn AstRewriter,
) -> FederationResult<Expression> {
    if let Some(replacement) = rewriter.rewrite_expression(expr)? {
        return Ok(replacement);
    }
    Ok(match expr {
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: boxed(operand, rewriter)?,
        },
        Expression::BinaryOp { op, left, right } => Expression::BinaryOp {
            op: *op,
            left: boxed(left, rewriter)?,
            right: boxed(right, rewriter)?,
        },
        Expression::FunctionCall {
            name,
            args,
            distinct,
        } => Expression::FunctionCall {
            name: name.clone(),
            args: transform_all(args, rewriter)?,
            distinct: *distinct,
        },
        Expression::CaseExpr { branches, default } => Expression::CaseExpr {
            branches: branches
                .iter()
                .map(|(c, r)| {
                    Ok((
                        transform_expression(c, rewriter)?,
                        transform_expression(r, rewriter)?,
                    ))
                })
                .collect::<FederationResult<Vec<_>>>()?,
            default: default
                .as_deref()
                .map(|d| boxed(d, rewriter))
                .transpose()?,
        },
        Expression::TypeCast { operand, data_type } => Expression::TypeCast {
            operand: boxed(operand, rewriter)?,
            data_type: data_type.clone(),
        },
        Expression::List(items) => Expression::List(transform_all(items, rewriter)?),
        Expression::Identifier(_)
        | Expression::Constant(_)
        | Expression::Star { .. }
        | Expression::Subquery(_) => expr.clone(),
    })
}

fn boxed(expr: &Expression, rewriter: &mut dyn AstRewriter) -> FederationResult<Box<Expression>> {
    Ok(Box::new(transform_expression(expr, rewriter)?))
}

fn transform_optional(
    expr: Option<&Expression>,
    rewriter: &mut dyn AstRewriter,
) -> FederationResult<Option<Expression>> {
    expr.map(|e| transform_expression(e, rewriter)).transpose()
}

fn transform_all(
    exprs: &[Expression],
    rewriter: &mut dyn AstRewriter,
) -> FederationResult<Vec<Expression>> {
    exprs
        .iter()
        .map(|e| transform_expression(e, rewriter))
        .collect()
}
