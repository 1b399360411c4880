//! Step/Plan model
//!
//! A [`Plan`] is an ordered DAG of [`Step`]s. Steps only reference inputs
//! that precede them, and the last step is the single final step whose
//! output is the query result. A plan is immutable once built.

use crate::common::error::{FederationError, FederationResult};
use crate::parser::ast::{Expression, Query};
use crate::planner::filters::FilterCondition;
use serde::Serialize;
use std::fmt;

/// Index of a step within its plan
pub type StepId = usize;

/// Raw fetch against a federated source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchStep {
    pub source: String,
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<FilterCondition>,
    /// Non-binding size hint; the local stage applies the real LIMIT
    pub limit_hint: Option<usize>,
}

/// A local table the engine must load before running a step's SQL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalTableScan {
    pub source: String,
    pub table: String,
    /// Name the SQL refers to the table by
    pub relation: String,
}

/// SQL run by the local engine over input relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalExecStep {
    /// The query as planned, with sub-plans substituted
    pub query: Query,
    /// Rendered SQL; reads inputs by their relation names
    pub sql: String,
    pub local_tables: Vec<LocalTableScan>,
}

/// Local join of per-table relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinStep {
    /// ON conditions of every join edge, in FROM order
    pub conditions: Vec<Expression>,
    pub query: Query,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StepKind {
    Fetch(FetchStep),
    LocalExec(LocalExecStep),
    Join(JoinStep),
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Fetch(_) => "Fetch",
            StepKind::LocalExec(_) => "LocalExec",
            StepKind::Join(_) => "Join",
        }
    }

    /// Query carried by a local step
    pub fn query(&self) -> Option<&Query> {
        match self {
            StepKind::Fetch(_) => None,
            StepKind::LocalExec(step) => Some(&step.query),
            StepKind::Join(step) => Some(&step.query),
        }
    }

    /// SQL the local engine runs for this step
    pub fn sql(&self) -> Option<&str> {
        match self {
            StepKind::Fetch(_) => None,
            StepKind::LocalExec(step) => Some(&step.sql),
            StepKind::Join(step) => Some(&step.sql),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub id: StepId,
    pub kind: StepKind,
    pub inputs: Vec<StepId>,
    /// Name of the relation this step produces
    pub output: String,
    /// Columns of the produced relation, in order
    pub columns: Vec<String>,
    pub is_final: bool,
}

impl Step {
    pub fn as_fetch(&self) -> Option<&FetchStep> {
        match &self.kind {
            StepKind::Fetch(fetch) => Some(fetch),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalExecStep> {
        match &self.kind {
            StepKind::LocalExec(local) => Some(local),
            _ => None,
        }
    }

    pub fn as_join(&self) -> Option<&JoinStep> {
        match &self.kind {
            StepKind::Join(join) => Some(join),
            _ => None,
        }
    }
}

/// Execution plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
    final_step: StepId,
}

impl Plan {
    /// Validate and seal a list of steps
    pub fn new(steps: Vec<Step>) -> FederationResult<Self> {
        if steps.is_empty() {
            return Err(crate::internal_err!("plan has no steps"));
        }
        for (index, step) in steps.iter().enumerate() {
            if step.id != index {
                return Err(crate::internal_err!("step {} stored at position {}", step.id, index));
            }
            if let Some(bad) = step.inputs.iter().find(|&&input| input >= step.id) {
                return Err(crate::internal_err!(
                    "step {} reads step {} which does not precede it",
                    step.id,
                    bad
                ));
            }
        }

        let finals: Vec<StepId> = steps.iter().filter(|s| s.is_final).map(|s| s.id).collect();
        let final_step = match finals.as_slice() {
            [only] if *only == steps.len() - 1 => *only,
            _ => {
                return Err(crate::internal_err!(
                    "expected the last step to be the only final step, found {:?}",
                    finals
                ))
            }
        };

        Ok(Self { steps, final_step })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> FederationResult<&Step> {
        self.steps
            .get(id)
            .ok_or_else(|| FederationError::InvalidArgument(format!("no step {}", id)))
    }

    pub fn final_step(&self) -> &Step {
        &self.steps[self.final_step]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn fetch_steps(&self) -> impl Iterator<Item = (&Step, &FetchStep)> {
        self.steps.iter().filter_map(|s| s.as_fetch().map(|f| (s, f)))
    }

    /// Group steps into waves; every input of a step lies in an earlier wave
    pub fn waves(&self) -> Vec<Vec<StepId>> {
        let mut level = vec![0usize; self.steps.len()];
        for step in &self.steps {
            level[step.id] = step
                .inputs
                .iter()
                .map(|&input| level[input] + 1)
                .max()
                .unwrap_or(0);
        }

        let depth = level.iter().copied().max().unwrap_or(0);
        let mut waves = vec![Vec::new(); depth + 1];
        for step in &self.steps {
            waves[level[step.id]].push(step.id);
        }
        waves
    }

    /// Whether any embedded query still carries a WITH binding
    pub fn has_cte_binding(&self) -> bool {
        self.steps
            .iter()
            .filter_map(|s| s.kind.query())
            .any(Query::has_cte_binding)
    }

    /// JSON rendering of the plan
    pub fn to_json(&self) -> FederationResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            let marker = if step.is_final { " (final)" } else { "" };
            write!(f, "{}: {} -> {}{}", step.id, step.kind.name(), step.output, marker)?;
            if !step.inputs.is_empty() {
                let inputs: Vec<String> = step.inputs.iter().map(|i| i.to_string()).collect();
                write!(f, " [inputs: {}]", inputs.join(", "))?;
            }
            writeln!(f)?;
            match &step.kind {
                StepKind::Fetch(fetch) => {
                    writeln!(f, "    table:   {}.{}", fetch.source, fetch.table)?;
                    writeln!(f, "    columns: {}", fetch.columns.join(", "))?;
                    if !fetch.filters.is_empty() {
                        let filters: Vec<String> =
                            fetch.filters.iter().map(|c| c.to_string()).collect();
                        writeln!(f, "    filters: {}", filters.join(" AND "))?;
                    }
                    if let Some(limit) = fetch.limit_hint {
                        writeln!(f, "    limit:   {}", limit)?;
                    }
                }
                StepKind::LocalExec(local) => {
                    for scan in &local.local_tables {
                        writeln!(f, "    load:    {}.{} as {}", scan.source, scan.table, scan.relation)?;
                    }
                    writeln!(f, "    sql:     {}", local.sql)?;
                }
                StepKind::Join(join) => {
                    writeln!(f, "    sql:     {}", join.sql)?;
                }
            }
        }
        Ok(())
    }
}
