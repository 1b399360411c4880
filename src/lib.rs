//! Prism Federation - federated SQL query planner
//!
//! Plans SELECT queries over tables that live in remote, fetch-only sources
//! next to tables a local SQL engine can read directly. A query is split into
//! raw fetches (only the columns and simple filters a source can serve) and
//! local steps that run the remaining SQL over the fetched relations.
//!
pub mod catalog;
pub mod common;
pub mod config;
pub mod database;
pub mod execution;
pub mod parser;
pub mod planner;
pub mod types;

// Re-export common types for convenience
pub use common::{FederationError, FederationResult};

// Re-export catalog system for convenience
pub use catalog::{load_catalog, DataSource, FetchRequest, MemorySource, SourceRegistry};

pub use config::PlannerConfig;

// Re-export type system for convenience
pub use types::{Relation, Value};

// Re-export parser for convenience
pub use parser::{parse_query, Expression, Query, TableReference};

// Re-export planner system for convenience
pub use planner::{
    plan_query, FetchStep, FilterCondition, FilterOperator, FilterValue, JoinStep, LocalExecStep,
    Plan, QueryPlanner, Step, StepId, StepKind,
};

// Re-export execution for convenience
pub use execution::{ExecutionStats, LocalEngine, PlanExecutor, SqliteEngine};

pub use crate::database::{FederatedDatabase, QueryResult};
