//! Plan Builder
//!
//! Entry point of planning. A query is first elaborated (WITH definitions,
//! derived tables and expression subqueries become sub-plans), then split
//! according to its FROM clause:
//!
//! - no FROM, a planned relation, or only local tables: one local step
//! - one federated table: a fetch plus a local step over the fetched rows
//! - a join touching a federated table: see [`crate::planner::join`]

use crate::catalog::{RegisteredTable, SourceRegistry};
use crate::common::error::{FederationError, FederationResult};
use crate::config::PlannerConfig;
use crate::parser::ast::*;
use crate::planner::cte::CteScope;
use crate::planner::filters::{classify_conjunct, FilterCondition};
use crate::planner::plan::*;
use crate::planner::traversal::{materialized_inputs, referenced_columns, split_conjuncts};
use tracing::{debug, info, warn};

/// Query planner
pub struct QueryPlanner<'a> {
    registry: &'a SourceRegistry,
    config: PlannerConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self::with_config(registry, PlannerConfig::default())
    }

    pub fn with_config(registry: &'a SourceRegistry, config: PlannerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build the plan for `query`. The query itself is never modified.
    pub fn plan(&self, query: &Query) -> FederationResult<Plan> {
        self.finish(PlanContext::new(self.registry, &self.config), query)
    }

    /// Plan an elaborated query whose planned relations are steps of `plan`.
    ///
    /// Every step of `plan` except its final one is kept as is, so
    /// re-planning the query of `plan`'s final step reproduces `plan`.
    pub fn replan(&self, plan: &Plan, query: &Query) -> FederationResult<Plan> {
        let mut ctx = PlanContext::new(self.registry, &self.config);
        ctx.steps = plan.steps()[..plan.len() - 1].to_vec();
        for step in &ctx.steps {
            if step.output != format!("{}_{}", self.config.relation_prefix, step.id) {
                return Err(FederationError::InvalidArgument(format!(
                    "step {} was planned with another relation prefix",
                    step.id
                )));
            }
        }
        self.finish(ctx, query)
    }

    fn finish(&self, mut ctx: PlanContext<'_>, query: &Query) -> FederationResult<Plan> {
        let final_id = ctx.plan_query(query, &CteScope::default())?;

        let mut steps = ctx.steps;
        if final_id + 1 != steps.len() {
            return Err(crate::internal_err!(
                "final step {} is not the last of {} steps",
                final_id,
                steps.len()
            ));
        }
        steps[final_id].is_final = true;

        let plan = Plan::new(steps)?;
        info!(
            steps = plan.len(),
            fetches = plan.fetch_steps().count(),
            "plan built"
        );
        Ok(plan)
    }
}

/// Plan `query` against `registry` with the default configuration
pub fn plan_query(query: &Query, registry: &SourceRegistry) -> FederationResult<Plan> {
    QueryPlanner::new(registry).plan(query)
}

/// State of one planning call: the steps emitted so far
pub(crate) struct PlanContext<'a> {
    pub(crate) registry: &'a SourceRegistry,
    pub(crate) config: &'a PlannerConfig,
    steps: Vec<Step>,
}

impl<'a> PlanContext<'a> {
    fn new(registry: &'a SourceRegistry, config: &'a PlannerConfig) -> Self {
        Self {
            registry,
            config,
            steps: Vec::new(),
        }
    }

    /// Plan a (sub)query and return the step producing its result
    pub(crate) fn plan_query(&mut self, query: &Query, scope: &CteScope) -> FederationResult<StepId> {
        let query = self.elaborate(query, scope)?;

        match &query.from {
            None => {
                let columns = output_columns(&query.targets, &[])?;
                Ok(self.emit_local_exec(query, Vec::new(), Vec::new(), columns))
            }
            Some(TableReference::Materialized(m)) => {
                let relations = [BoundRelation::materialized(m)];
                let columns = output_columns(&query.targets, &relations)?;
                Ok(self.emit_local_exec(query, Vec::new(), Vec::new(), columns))
            }
            Some(TableReference::NamedTable {
                source,
                table,
                alias,
            }) => {
                let registered = self.registry.resolve(source.as_deref(), table)?.clone();
                let binding = alias.clone().unwrap_or_else(|| table.clone());
                if registered.is_federated() {
                    self.plan_single_table(&query, &registered, &binding)
                } else {
                    debug!(table = %registered.qualified_name(), "local table, running query verbatim");
                    let relations = [BoundRelation::registered(&registered, &binding)];
                    let columns = output_columns(&query.targets, &relations)?;
                    let scan = local_scan(&registered, source.as_deref(), table);
                    Ok(self.emit_local_exec(query, vec![scan], Vec::new(), columns))
                }
            }
            Some(TableReference::Join { .. }) => self.plan_join(&query),
            Some(TableReference::Subquery { alias, .. }) => Err(crate::internal_err!(
                "derived table '{}' survived elaboration",
                alias
            )),
        }
    }

    /// One federated table: fetch what the query reads, run the query locally
    fn plan_single_table(
        &mut self,
        query: &Query,
        registered: &RegisteredTable,
        binding: &str,
    ) -> FederationResult<StepId> {
        let available = registered.source.get_columns();
        let relations = [BoundRelation {
            binding: binding.to_string(),
            display: registered.qualified_name(),
            columns: available.clone(),
        }];

        let mut usage = ColumnUsage::new(relations.len());
        usage.add_targets(&relations, &query.targets)?;
        let aliases = query.target_aliases();
        if let Some(where_clause) = &query.where_clause {
            usage.add_expression(&relations, where_clause, &[])?;
        }
        for expr in query
            .group_by
            .iter()
            .chain(query.having.iter())
            .chain(query.order_by.iter().map(|o| &o.expression))
        {
            usage.add_expression(&relations, expr, &aliases)?;
        }

        // `*` needs every column even though it counts as a plain target
        let fetch_everything = query
            .targets
            .iter()
            .any(|t| !t.is_plain() || matches!(t.expr, Expression::Star { .. }));
        let mut columns = if fetch_everything {
            available.clone()
        } else {
            usage.ordered(0, &available)
        };
        if columns.is_empty() {
            warn!(table = %registered.qualified_name(), "no referenced columns, fetching all");
            columns = available.clone();
        }

        let conjuncts = query
            .where_clause
            .as_ref()
            .map(split_conjuncts)
            .unwrap_or_default();
        let mut filters = Vec::new();
        for conjunct in &conjuncts {
            if let Some(candidate) = classify_conjunct(conjunct) {
                let owners = resolve_column(&relations, &candidate.column)?;
                if let Some((_, column)) = owners.first() {
                    let column = column.clone();
                    filters.push(candidate.into_condition(&column));
                }
            }
        }

        let limit_hint = if self.config.push_limit_hint
            && filters.len() == conjuncts.len()
            && query.order_by.is_empty()
            && query.group_by.is_empty()
            && query.having.is_none()
            && !query.distinct
            && query.targets.iter().all(Target::is_plain)
        {
            query.limit
        } else {
            None
        };

        let fetch = self.emit_fetch(registered, columns.clone(), filters, limit_hint);

        let relation = self.materialized(fetch, binding);
        let mut executed = query.clone();
        executed.from = Some(TableReference::Materialized(relation));
        let bound = [BoundRelation {
            binding: binding.to_string(),
            display: registered.qualified_name(),
            columns,
        }];
        let output = output_columns(&executed.targets, &bound)?;
        Ok(self.emit_local_exec(executed, Vec::new(), vec![fetch], output))
    }

    pub(crate) fn emit_fetch(
        &mut self,
        registered: &RegisteredTable,
        columns: Vec<String>,
        filters: Vec<FilterCondition>,
        limit_hint: Option<usize>,
    ) -> StepId {
        let fetch = FetchStep {
            source: registered.source_id.clone(),
            table: registered.table.clone(),
            columns: columns.clone(),
            filters,
            limit_hint,
        };
        debug!(
            table = %registered.qualified_name(),
            columns = ?fetch.columns,
            filters = fetch.filters.len(),
            limit_hint = ?fetch.limit_hint,
            "fetch"
        );
        self.add_step(StepKind::Fetch(fetch), Vec::new(), columns)
    }

    /// Emit a local step running `query`; every step output it reads becomes an input
    pub(crate) fn emit_local_exec(
        &mut self,
        query: Query,
        local_tables: Vec<LocalTableScan>,
        inputs: Vec<StepId>,
        columns: Vec<String>,
    ) -> StepId {
        let inputs = with_materialized_inputs(&query, inputs);
        let sql = query.to_string();
        let step = LocalExecStep {
            query,
            sql,
            local_tables,
        };
        self.add_step(StepKind::LocalExec(step), inputs, columns)
    }

    pub(crate) fn emit_join(
        &mut self,
        query: Query,
        conditions: Vec<Expression>,
        inputs: Vec<StepId>,
        columns: Vec<String>,
    ) -> StepId {
        let inputs = with_materialized_inputs(&query, inputs);
        let sql = query.to_string();
        let step = JoinStep {
            conditions,
            query,
            sql,
        };
        self.add_step(StepKind::Join(step), inputs, columns)
    }

    fn add_step(&mut self, kind: StepKind, inputs: Vec<StepId>, columns: Vec<String>) -> StepId {
        let id = self.steps.len();
        let output = format!("{}_{}", self.config.relation_prefix, id);
        debug!(step = id, kind = kind.name(), inputs = ?inputs, output = %output, "planned step");
        self.steps.push(Step {
            id,
            kind,
            inputs,
            output,
            columns,
            is_final: false,
        });
        id
    }

    /// Whether `step` is a raw fetch from a federated source
    pub(crate) fn is_fetch(&self, step: StepId) -> bool {
        self.steps
            .get(step)
            .is_some_and(|s| matches!(s.kind, StepKind::Fetch(_)))
    }

    /// Reference to the output of `step`, bound to `alias`
    pub(crate) fn materialized(&self, step: StepId, alias: &str) -> MaterializedRelation {
        let produced = &self.steps[step];
        MaterializedRelation {
            step,
            relation: produced.output.clone(),
            columns: produced.columns.clone(),
            alias: alias.to_string(),
        }
    }
}

fn with_materialized_inputs(query: &Query, mut inputs: Vec<StepId>) -> Vec<StepId> {
    inputs.extend(materialized_inputs(query).into_iter().map(|m| m.step));
    inputs.sort_unstable();
    inputs.dedup();
    inputs
}

pub(crate) fn local_scan(
    registered: &RegisteredTable,
    source: Option<&str>,
    table: &str,
) -> LocalTableScan {
    LocalTableScan {
        source: registered.source_id.clone(),
        table: registered.table.clone(),
        relation: TableReference::local_relation_name(source, table),
    }
}

/// A FROM item as seen by column resolution
#[derive(Debug, Clone)]
pub(crate) struct BoundRelation {
    /// Name columns are qualified with (alias, or table name)
    pub binding: String,
    /// Name used in error messages
    pub display: String,
    pub columns: Vec<String>,
}

impl BoundRelation {
    pub(crate) fn registered(registered: &RegisteredTable, binding: &str) -> Self {
        Self {
            binding: binding.to_string(),
            display: registered.qualified_name(),
            columns: registered.source.get_columns(),
        }
    }

    pub(crate) fn materialized(m: &MaterializedRelation) -> Self {
        Self {
            binding: m.alias.clone(),
            display: m.alias.clone(),
            columns: m.columns.clone(),
        }
    }

    fn column(&self, name: &str) -> Option<&String> {
        self.columns.iter().find(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Relations (by index) declaring `column`, with the declared spelling
pub(crate) fn resolve_column(
    relations: &[BoundRelation],
    column: &ColumnRef,
) -> FederationResult<Vec<(usize, String)>> {
    match &column.table {
        Some(qualifier) => {
            let (index, relation) = relations
                .iter()
                .enumerate()
                .find(|(_, r)| r.binding.eq_ignore_ascii_case(qualifier))
                .ok_or_else(|| FederationError::unsupported_column(qualifier, &column.name))?;
            let declared = relation
                .column(&column.name)
                .ok_or_else(|| FederationError::unsupported_column(&relation.display, &column.name))?;
            Ok(vec![(index, declared.clone())])
        }
        None => {
            let owners: Vec<(usize, String)> = relations
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.column(&column.name).map(|c| (i, c.clone())))
                .collect();
            if owners.is_empty() {
                let tables: Vec<&str> = relations.iter().map(|r| r.display.as_str()).collect();
                return Err(FederationError::unsupported_column(tables.join(", "), &column.name));
            }
            Ok(owners)
        }
    }
}

/// Columns referenced per relation, by declared name
#[derive(Debug, Clone)]
pub(crate) struct ColumnUsage {
    per_relation: Vec<Vec<String>>,
}

impl ColumnUsage {
    pub(crate) fn new(relations: usize) -> Self {
        Self {
            per_relation: vec![Vec::new(); relations],
        }
    }

    pub(crate) fn add(&mut self, relation: usize, column: &str) {
        let used = &mut self.per_relation[relation];
        if !used.iter().any(|c| c == column) {
            used.push(column.to_string());
        }
    }

    pub(crate) fn contains(&self, relation: usize, column: &str) -> bool {
        self.per_relation[relation].iter().any(|c| c == column)
    }

    /// Used columns of `relation`, in declaration order
    pub(crate) fn ordered(&self, relation: usize, declared: &[String]) -> Vec<String> {
        declared
            .iter()
            .filter(|c| self.contains(relation, c))
            .cloned()
            .collect()
    }

    /// Target list: `*` uses every column, `t.*` every column of `t`
    pub(crate) fn add_targets(
        &mut self,
        relations: &[BoundRelation],
        targets: &[Target],
    ) -> FederationResult<()> {
        for target in targets {
            match &target.expr {
                Expression::Star { table: None } => {
                    for (i, relation) in relations.iter().enumerate() {
                        for column in &relation.columns {
                            self.add(i, column);
                        }
                    }
                }
                Expression::Star {
                    table: Some(qualifier),
                } => {
                    let index = star_relation(relations, qualifier)?;
                    for column in &relations[index].columns {
                        self.add(index, column);
                    }
                }
                expr => self.add_expression(relations, expr, &[])?,
            }
        }
        Ok(())
    }

    /// Columns of `expr`; unresolvable bare names listed in `aliases` are skipped
    pub(crate) fn add_expression(
        &mut self,
        relations: &[BoundRelation],
        expr: &Expression,
        aliases: &[&str],
    ) -> FederationResult<()> {
        for column in referenced_columns(expr) {
            match resolve_column(relations, &column) {
                Ok(owners) => {
                    for (index, name) in owners {
                        self.add(index, &name);
                    }
                }
                Err(_)
                    if column.table.is_none()
                        && aliases.iter().any(|a| a.eq_ignore_ascii_case(&column.name)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn star_relation(relations: &[BoundRelation], qualifier: &str) -> FederationResult<usize> {
    relations
        .iter()
        .position(|r| r.binding.eq_ignore_ascii_case(qualifier))
        .ok_or_else(|| FederationError::unsupported_column(qualifier, "*"))
}

/// Column names of the relation a query over `relations` produces
pub(crate) fn output_columns(
    targets: &[Target],
    relations: &[BoundRelation],
) -> FederationResult<Vec<String>> {
    let mut columns = Vec::new();
    for target in targets {
        match (&target.expr, &target.alias) {
            (Expression::Star { table: None }, None) => {
                if relations.is_empty() {
                    return Err(FederationError::InvalidArgument(
                        "SELECT * requires a FROM clause".to_string(),
                    ));
                }
                for relation in relations {
                    columns.extend(relation.columns.iter().cloned());
                }
            }
            (Expression::Star { table: Some(q) }, None) => {
                let index = star_relation(relations, q)?;
                columns.extend(relations[index].columns.iter().cloned());
            }
            _ => columns.push(target.output_name()),
        }
    }
    Ok(columns)
}
