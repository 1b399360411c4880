//! CTE Elaborator
//!
//! Turns every nested query into a sub-plan before the outer query is split.
//! WITH definitions are planned in order (each sees the ones before it), and
//! references to them, derived tables and expression subqueries are replaced
//! by [`MaterializedRelation`]s pointing at the planned steps. The elaborated
//! query carries no WITH clause.

use crate::common::error::FederationResult;
use crate::common::helper::normalize_identifier;
use crate::parser::ast::*;
use crate::planner::builder::PlanContext;
use crate::planner::traversal::{transform_query, AstRewriter};
use std::collections::HashMap;
use tracing::debug;

/// WITH names visible at one nesting level
#[derive(Debug, Clone, Default)]
pub(crate) struct CteScope {
    bindings: HashMap<String, MaterializedRelation>,
}

impl CteScope {
    pub(crate) fn get(&self, name: &str) -> Option<&MaterializedRelation> {
        self.bindings.get(&normalize_identifier(name))
    }

    /// Later definitions shadow earlier ones of the same name
    pub(crate) fn bind(&mut self, name: &str, relation: MaterializedRelation) {
        self.bindings.insert(normalize_identifier(name), relation);
    }
}

impl PlanContext<'_> {
    /// Plan the nested queries of `query` and substitute their results
    pub(crate) fn elaborate(&mut self, query: &Query, outer: &CteScope) -> FederationResult<Query> {
        let mut scope = outer.clone();
        for cte in query.cte.iter().flatten() {
            let step = self.plan_query(&cte.query, &scope)?;
            debug!(cte = %cte.name, step, "planned WITH definition");
            let relation = self.materialized(step, &cte.name);
            scope.bind(&cte.name, relation);
        }

        let mut rewriter = Substitution {
            ctx: self,
            scope: &scope,
        };
        let mut elaborated = transform_query(query, &mut rewriter)?;
        elaborated.cte = None;
        Ok(elaborated)
    }
}

struct Substitution<'c, 'a> {
    ctx: &'c mut PlanContext<'a>,
    scope: &'c CteScope,
}

impl AstRewriter for Substitution<'_, '_> {
    fn rewrite_table_reference(
        &mut self,
        table: &TableReference,
    ) -> FederationResult<Option<TableReference>> {
        match table {
            TableReference::NamedTable {
                source: None,
                table,
                alias,
            } => Ok(self.scope.get(table).map(|bound| {
                TableReference::Materialized(MaterializedRelation {
                    alias: alias.clone().unwrap_or_else(|| table.clone()),
                    ..bound.clone()
                })
            })),
            TableReference::Subquery { query, alias } => {
                let step = self.ctx.plan_query(query, self.scope)?;
                debug!(alias = %alias, step, "planned derived table");
                Ok(Some(TableReference::Materialized(
                    self.ctx.materialized(step, alias),
                )))
            }
            _ => Ok(None),
        }
    }

    fn rewrite_expression(&mut self, expr: &Expression) -> FederationResult<Option<Expression>> {
        match expr {
            Expression::Subquery(query) if reads_planned_relation(query) => Ok(Some(expr.clone())),
            Expression::Subquery(query) => {
                let step = self.ctx.plan_query(query, self.scope)?;
                let output = self.ctx.materialized(step, "");
                let relation = MaterializedRelation {
                    alias: output.relation.clone(),
                    ..output
                };
                debug!(step, "planned expression subquery");
                Ok(Some(Expression::Subquery(Box::new(Query::select_all(
                    TableReference::Materialized(relation),
                )))))
            }
            _ => Ok(None),
        }
    }
}

/// `SELECT * FROM <planned step>`, the form an elaborated subquery takes
fn reads_planned_relation(query: &Query) -> bool {
    match &query.from {
        Some(from @ TableReference::Materialized(_)) => *query == Query::select_all(from.clone()),
        _ => false,
    }
}
