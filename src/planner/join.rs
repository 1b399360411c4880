//! Join Planner
//!
//! Plans a FROM clause joining several relations, at least one of them
//! federated. Each federated table gets its own fetch carrying the filters
//! that belong to it alone; local tables are read by a local step; already
//! planned relations are used as they are. A final join step joins the
//! per-table relations and re-applies everything that was not safely pushed.
//!
//! Column attribution rules:
//!
//! - `t.col` belongs to the relation bound as `t` (alias, or table name)
//! - a bare `col` belongs to every relation declaring it
//! - a filter is pushed only when its column belongs to exactly one
//!   federated relation, and never when WHERE contains an OR
//! - join conditions are never pushed

use crate::catalog::RegisteredTable;
use crate::common::error::{FederationError, FederationResult};
use crate::common::helper::normalize_identifier;
use crate::parser::ast::*;
use crate::planner::builder::{
    local_scan, output_columns, resolve_column, BoundRelation, ColumnUsage, PlanContext,
};
use crate::planner::filters::{classify_conjunct, FilterCondition};
use crate::planner::plan::{LocalTableScan, StepId};
use crate::planner::traversal::{
    combine_conjuncts, contains_or, split_conjuncts, transform_query, AstRewriter,
};
use std::collections::HashMap;
use tracing::{debug, warn};

enum LeafKind {
    Federated(RegisteredTable),
    Local {
        registered: RegisteredTable,
        /// Scan under the name the query itself uses
        scan: LocalTableScan,
    },
    Materialized(MaterializedRelation),
}

struct Leaf {
    relation: BoundRelation,
    kind: LeafKind,
    /// On the null-extended side of an outer join
    nullable: bool,
}

impl Leaf {
    fn is_federated(&self) -> bool {
        matches!(self.kind, LeafKind::Federated(_))
    }
}

/// Leaves of the join tree in FROM order, plus every ON condition
#[derive(Default)]
struct JoinGraph {
    leaves: Vec<Leaf>,
    conditions: Vec<Expression>,
}

impl JoinGraph {
    /// Whether the join reads federated rows, either directly or through a
    /// fetch planned earlier (an elaborated join being planned again)
    fn reads_federated(&self, ctx: &PlanContext<'_>) -> bool {
        self.leaves.iter().any(|leaf| match &leaf.kind {
            LeafKind::Federated(_) => true,
            LeafKind::Materialized(m) => ctx.is_fetch(m.step),
            LeafKind::Local { .. } => false,
        })
    }
}

impl PlanContext<'_> {
    pub(crate) fn plan_join(&mut self, query: &Query) -> FederationResult<StepId> {
        let Some(from) = &query.from else {
            return Err(crate::internal_err!("join planning requires a FROM clause"));
        };

        let mut graph = JoinGraph::default();
        self.flatten(from, &mut graph)?;
        check_bindings(&graph)?;
        let relations: Vec<BoundRelation> =
            graph.leaves.iter().map(|l| l.relation.clone()).collect();

        if !graph.reads_federated(self) {
            debug!(relations = relations.len(), "join without federated tables, running query verbatim");
            let scans = graph
                .leaves
                .iter()
                .filter_map(|leaf| match &leaf.kind {
                    LeafKind::Local { scan, .. } => Some(scan.clone()),
                    _ => None,
                })
                .collect();
            let columns = output_columns(&query.targets, &relations)?;
            return Ok(self.emit_local_exec(query.clone(), scans, Vec::new(), columns));
        }

        // Columns read outside the filter role
        let aliases = query.target_aliases();
        let mut outside = ColumnUsage::new(relations.len());
        outside.add_targets(&relations, &query.targets)?;
        for condition in &graph.conditions {
            outside.add_expression(&relations, condition, &[])?;
        }
        for expr in query
            .group_by
            .iter()
            .chain(query.having.iter())
            .chain(query.order_by.iter().map(|o| &o.expression))
        {
            outside.add_expression(&relations, expr, &aliases)?;
        }

        let original = query
            .where_clause
            .as_ref()
            .map(split_conjuncts)
            .unwrap_or_default();
        let pushdown = if query.where_clause.as_ref().is_some_and(contains_or) {
            debug!("WHERE contains OR, no filter pushdown");
            Vec::new()
        } else {
            original.clone()
        };

        let mut filters: Vec<Vec<FilterCondition>> = vec![Vec::new(); relations.len()];
        let mut pushed: Vec<Option<(usize, String)>> = vec![None; original.len()];
        for (index, conjunct) in pushdown.iter().enumerate() {
            let Some(candidate) = classify_conjunct(conjunct) else {
                continue;
            };
            let owners = resolve_column(&relations, &candidate.column)?;
            if let [(leaf, column)] = owners.as_slice() {
                if graph.leaves[*leaf].is_federated() {
                    pushed[index] = Some((*leaf, column.clone()));
                    filters[*leaf].push(candidate.into_condition(column));
                }
            }
        }
        for (conjunct, target) in original.iter().zip(&pushed) {
            if target.is_none() {
                outside.add_expression(&relations, conjunct, &[])?;
            }
        }

        // Nullable relations keep their filter columns so the join can re-check them
        let mut needed = outside;
        for (leaf, column) in pushed.iter().flatten() {
            if graph.leaves[*leaf].nullable {
                needed.add(*leaf, column);
            }
        }

        let mut inputs = Vec::with_capacity(graph.leaves.len());
        let mut substitutions = HashMap::new();
        let mut fetched = Vec::with_capacity(graph.leaves.len());
        for (index, leaf) in graph.leaves.iter().enumerate() {
            let declared = &leaf.relation.columns;
            let step = match &leaf.kind {
                LeafKind::Federated(registered) => {
                    let columns = non_empty(needed.ordered(index, declared), leaf);
                    let leaf_filters = std::mem::take(&mut filters[index]);
                    self.emit_fetch(registered, columns, leaf_filters, None)
                }
                LeafKind::Local { registered, .. } => {
                    let columns = non_empty(needed.ordered(index, declared), leaf);
                    let scan = local_scan(registered, Some(&registered.source_id), &registered.table);
                    let targets = columns
                        .iter()
                        .map(|c| Target::new(Expression::column(c)))
                        .collect();
                    let mut read = Query::new(targets);
                    read.from = Some(TableReference::named(
                        Some(&registered.source_id),
                        &registered.table,
                        None,
                    ));
                    self.emit_local_exec(read, vec![scan], Vec::new(), columns)
                }
                LeafKind::Materialized(m) => m.step,
            };

            let relation = self.materialized(step, &leaf.relation.binding);
            fetched.push(BoundRelation {
                columns: relation.columns.clone(),
                ..leaf.relation.clone()
            });
            substitutions.insert(normalize_identifier(&leaf.relation.binding), relation);
            inputs.push(step);
        }

        // Drop only conjuncts whose column the join no longer sees
        let residual: Vec<Expression> = original
            .iter()
            .zip(&pushed)
            .filter(|(_, target)| match target {
                Some((leaf, column)) => fetched[*leaf].columns.contains(column),
                None => true,
            })
            .map(|(conjunct, _)| conjunct.clone())
            .collect();
        debug!(
            conjuncts = original.len(),
            residual = residual.len(),
            "join residual filters"
        );

        let mut joined = transform_query(query, &mut LeafSubstitution { substitutions })?;
        joined.where_clause = combine_conjuncts(residual);
        let columns = output_columns(&joined.targets, &fetched)?;
        Ok(self.emit_join(joined, graph.conditions, inputs, columns))
    }

    fn flatten(&self, table: &TableReference, graph: &mut JoinGraph) -> FederationResult<()> {
        match table {
            TableReference::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let start = graph.leaves.len();
                self.flatten(left, graph)?;
                let middle = graph.leaves.len();
                self.flatten(right, graph)?;

                let (left_nullable, right_nullable) = match join_type {
                    JoinType::Left => (false, true),
                    JoinType::Right => (true, false),
                    JoinType::Full => (true, true),
                    JoinType::Inner | JoinType::Cross => (false, false),
                };
                if left_nullable {
                    graph.leaves[start..middle].iter_mut().for_each(|l| l.nullable = true);
                }
                if right_nullable {
                    graph.leaves[middle..].iter_mut().for_each(|l| l.nullable = true);
                }
                if let Some(condition) = condition {
                    graph.conditions.push(condition.clone());
                }
            }
            TableReference::NamedTable {
                source,
                table,
                alias,
            } => {
                let registered = self.registry.resolve(source.as_deref(), table)?.clone();
                let binding = alias.clone().unwrap_or_else(|| table.clone());
                let relation = BoundRelation::registered(&registered, &binding);
                let kind = if registered.is_federated() {
                    LeafKind::Federated(registered)
                } else {
                    LeafKind::Local {
                        scan: local_scan(&registered, source.as_deref(), table),
                        registered,
                    }
                };
                graph.leaves.push(Leaf {
                    relation,
                    kind,
                    nullable: false,
                });
            }
            TableReference::Materialized(m) => graph.leaves.push(Leaf {
                relation: BoundRelation::materialized(m),
                kind: LeafKind::Materialized(m.clone()),
                nullable: false,
            }),
            TableReference::Subquery { alias, .. } => {
                return Err(crate::internal_err!(
                    "derived table '{}' survived elaboration",
                    alias
                ))
            }
        }
        Ok(())
    }
}

fn check_bindings(graph: &JoinGraph) -> FederationResult<()> {
    let mut seen = Vec::with_capacity(graph.leaves.len());
    for leaf in &graph.leaves {
        let binding = normalize_identifier(&leaf.relation.binding);
        if seen.contains(&binding) {
            return Err(FederationError::InvalidArgument(format!(
                "table name or alias '{}' is used more than once in FROM",
                leaf.relation.binding
            )));
        }
        seen.push(binding);
    }
    Ok(())
}

fn non_empty(columns: Vec<String>, leaf: &Leaf) -> Vec<String> {
    if columns.is_empty() {
        warn!(table = %leaf.relation.display, "no referenced columns, fetching all");
        return leaf.relation.columns.clone();
    }
    columns
}

/// Replaces every join leaf by the relation planned for it
struct LeafSubstitution {
    substitutions: HashMap<String, MaterializedRelation>,
}

impl AstRewriter for LeafSubstitution {
    fn rewrite_table_reference(
        &mut self,
        table: &TableReference,
    ) -> FederationResult<Option<TableReference>> {
        if table.is_join() {
            return Ok(None);
        }
        let binding = table
            .binding_name()
            .map(normalize_identifier)
            .unwrap_or_default();
        match self.substitutions.get(&binding) {
            Some(relation) => Ok(Some(TableReference::Materialized(relation.clone()))),
            None => Err(crate::internal_err!("join leaf '{}' was not planned", binding)),
        }
    }
}
