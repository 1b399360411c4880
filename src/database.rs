//! Federated database
//!
//! Ties the components together: a source registry, the parser, the planner
//! and the executor, behind a SQL-in / rows-out interface.

use crate::catalog::{load_catalog, SourceRegistry};
use crate::common::error::FederationResult;
use crate::config::PlannerConfig;
use crate::execution::{ExecutionStats, PlanExecutor};
use crate::parser::SqlParser;
use crate::planner::{Plan, QueryPlanner};
use crate::types::Relation;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main entry point for planning and running federated queries
pub struct FederatedDatabase {
    registry: SourceRegistry,
    config: PlannerConfig,
    parser: SqlParser,
}

/// Outcome of [`FederatedDatabase::execute_sql`]
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub plan: Plan,
    pub relation: Arc<Relation>,
    pub stats: ExecutionStats,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.relation.row_count()
    }
}

impl FederatedDatabase {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            config: PlannerConfig::default(),
            parser: SqlParser::new(),
        }
    }

    /// Open a database over the tables listed in a JSON catalog file
    pub fn open<P: AsRef<Path>>(catalog: P) -> FederationResult<Self> {
        Ok(Self::new(load_catalog(catalog)?))
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Change one setting, see [`PlannerConfig::set`]
    pub fn set(&mut self, key: &str, value: &str) -> FederationResult<()> {
        self.config.set(key, value)
    }

    /// Parse and plan without running anything
    pub fn plan_sql(&self, sql: &str) -> FederationResult<Plan> {
        let query = self.parser.parse(sql)?;
        debug!(sql = %sql, "parsed query");
        QueryPlanner::with_config(&self.registry, self.config.clone()).plan(&query)
    }

    /// Parse, plan and execute
    pub fn execute_sql(&self, sql: &str) -> FederationResult<QueryResult> {
        let plan = self.plan_sql(sql)?;
        let result = PlanExecutor::new(&self.registry)
            .with_config(self.config.clone())
            .execute(&plan)?;
        Ok(QueryResult {
            plan,
            relation: result.relation,
            stats: result.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemorySource;
    use crate::types::Value;

    #[test]
    fn test_execute_sql() {
        let mut registry = SourceRegistry::new();
        let owners = MemorySource::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::BigInt(1), Value::from("Ada")],
                vec![Value::BigInt(2), Value::from("Grace")],
            ],
            true,
        )
        .unwrap();
        registry.register("crm", "owners", Arc::new(owners)).unwrap();

        let mut db = FederatedDatabase::new(registry);
        db.set("push_limit_hint", "false").unwrap();
        let result = db.execute_sql("SELECT name FROM owners WHERE id = 2").unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.relation.rows[0][0], Value::from("Grace"));
        assert_eq!(result.plan.len(), 2);
    }
}
