//! Plan executor
//!
//! Steps run wave by wave (see [`Plan::waves`]); the steps of one wave are
//! independent and may run concurrently on a rayon pool. A step starts only
//! after all its inputs have produced their relations.

use crate::catalog::{FetchRequest, SourceRegistry};
use crate::common::error::{FederationError, FederationResult};
use crate::config::PlannerConfig;
use crate::execution::{LocalEngine, SqliteEngine};
use crate::planner::plan::{Plan, Step, StepId, StepKind};
use crate::types::Relation;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counters of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub steps_run: usize,
    /// Rows returned by federated fetches
    pub rows_fetched: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub relation: Arc<Relation>,
    pub stats: ExecutionStats,
}

/// Executes plans against the tables of a registry
pub struct PlanExecutor<'a> {
    registry: &'a SourceRegistry,
    engine: Box<dyn LocalEngine>,
    config: PlannerConfig,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self {
            registry,
            engine: Box::new(SqliteEngine::new()),
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn LocalEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Run every step and return the final step's relation
    pub fn execute(&self, plan: &Plan) -> FederationResult<ExecutionResult> {
        let start = Instant::now();
        let pool = if self.config.parallel_execution && self.config.max_parallel_steps > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.max_parallel_steps)
                    .build()
                    .map_err(|e| FederationError::Execution(format!("thread pool: {}", e)))?,
            )
        } else {
            None
        };

        let mut outputs: Vec<Option<Arc<Relation>>> = vec![None; plan.len()];
        for wave in plan.waves() {
            let done = &outputs;
            let results: Vec<(StepId, FederationResult<Relation>)> = match &pool {
                Some(pool) if wave.len() > 1 => pool.install(|| {
                    wave.par_iter()
                        .map(|&id| (id, self.run_step(plan, id, done)))
                        .collect()
                }),
                _ => wave
                    .iter()
                    .map(|&id| (id, self.run_step(plan, id, done)))
                    .collect(),
            };
            for (id, result) in results {
                outputs[id] = Some(Arc::new(result?));
            }
        }

        let relation = outputs[plan.final_step().id]
            .clone()
            .ok_or_else(|| crate::internal_err!("final step produced no relation"))?;
        let rows_fetched = plan
            .fetch_steps()
            .filter_map(|(step, _)| outputs[step.id].as_ref())
            .map(|r| r.row_count())
            .sum();
        let stats = ExecutionStats {
            steps_run: plan.len(),
            rows_fetched,
            elapsed_ms: start.elapsed().as_millis(),
        };
        info!(
            steps = stats.steps_run,
            rows_fetched = stats.rows_fetched,
            rows = relation.row_count(),
            elapsed_ms = stats.elapsed_ms as u64,
            "plan executed"
        );
        Ok(ExecutionResult { relation, stats })
    }

    fn run_step(
        &self,
        plan: &Plan,
        id: StepId,
        outputs: &[Option<Arc<Relation>>],
    ) -> FederationResult<Relation> {
        let step = plan.step(id)?;
        let relation = match &step.kind {
            StepKind::Fetch(fetch) => {
                let registered = self.registry.resolve(Some(&fetch.source), &fetch.table)?;
                let request = FetchRequest {
                    table: fetch.table.clone(),
                    columns: fetch.columns.clone(),
                    filters: fetch.filters.clone(),
                    limit: fetch.limit_hint,
                };
                let fetched = registered.source.fetch(&request)?;
                fetched.project(&fetch.columns).map_err(|e| {
                    FederationError::Source(format!("{}: {}", registered.qualified_name(), e))
                })?
            }
            StepKind::LocalExec(local) => {
                let mut tables = Vec::with_capacity(local.local_tables.len());
                for scan in &local.local_tables {
                    let registered = self.registry.resolve(Some(&scan.source), &scan.table)?;
                    let request = FetchRequest {
                        table: scan.table.clone(),
                        columns: registered.source.get_columns(),
                        filters: Vec::new(),
                        limit: None,
                    };
                    tables.push((scan.relation.clone(), Arc::new(registered.source.fetch(&request)?)));
                }
                self.run_sql(plan, step, &local.sql, tables, outputs)?
            }
            StepKind::Join(join) => self.run_sql(plan, step, &join.sql, Vec::new(), outputs)?,
        };

        debug!(
            step = id,
            kind = step.kind.name(),
            rows = relation.row_count(),
            "step finished"
        );
        Ok(relation)
    }

    fn run_sql(
        &self,
        plan: &Plan,
        step: &Step,
        sql: &str,
        mut tables: Vec<(String, Arc<Relation>)>,
        outputs: &[Option<Arc<Relation>>],
    ) -> FederationResult<Relation> {
        for &input in &step.inputs {
            let relation = outputs[input].clone().ok_or_else(|| {
                crate::internal_err!("step {} ran before its input {}", step.id, input)
            })?;
            tables.push((plan.step(input)?.output.clone(), relation));
        }

        let inputs: Vec<(String, &Relation)> = tables
            .iter()
            .map(|(name, relation)| (name.clone(), relation.as_ref()))
            .collect();
        let mut relation = self.engine.execute(sql, &inputs)?;

        // Downstream SQL refers to the names the plan declared
        if relation.columns.len() == step.columns.len() {
            relation.columns = step.columns.clone();
        } else {
            warn!(
                step = step.id,
                engine = self.engine.name(),
                declared = step.columns.len(),
                produced = relation.columns.len(),
                "step produced an unexpected number of columns"
            );
        }
        Ok(relation)
    }
}
