//! Plan execution
//!
//! Runs a [`crate::planner::Plan`]: fetch steps call their source, local and
//! join steps run their SQL on a [`LocalEngine`] over the relations produced
//! by their inputs.

pub mod executor;
pub mod sqlite;

pub use executor::*;
pub use sqlite::*;

use crate::common::error::FederationResult;
use crate::types::Relation;

/// SQL engine for the local stage of a plan
pub trait LocalEngine: Send + Sync {
    /// Run `sql` with each input relation visible as a table of the given name
    fn execute(&self, sql: &str, inputs: &[(String, &Relation)]) -> FederationResult<Relation>;

    fn name(&self) -> &'static str;
}
