//! Source catalog
//!
//! Maps table identifiers to the [`DataSource`] serving them. A federated
//! source only answers column/filter restricted fetches; a local source holds
//! a table the local engine may query with full SQL.

pub mod loader;
pub mod memory;

pub use loader::*;
pub use memory::*;

use crate::common::constants::SOURCE_SEPARATOR;
use crate::common::error::{FederationError, FederationResult};
use crate::common::helper::normalize_identifier;
use crate::planner::filters::FilterCondition;
use crate::types::Relation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Everything a source receives for one fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<FilterCondition>,
    pub limit: Option<usize>,
}

/// A table provider
pub trait DataSource: Send + Sync + Debug {
    /// `false` when the local engine may read the whole table and run any SQL on it
    fn is_federated(&self) -> bool;

    /// Declared columns, in order. Authoritative for planning.
    fn get_columns(&self) -> Vec<String>;

    /// Return rows restricted to `request.columns` that satisfy every filter.
    /// `limit` is a hint; returning more rows is allowed.
    fn fetch(&self, request: &FetchRequest) -> FederationResult<Relation>;
}

/// A table resolved from the registry
#[derive(Debug, Clone)]
pub struct RegisteredTable {
    pub source_id: String,
    pub table: String,
    pub source: Arc<dyn DataSource>,
}

impl RegisteredTable {
    pub fn is_federated(&self) -> bool {
        self.source.is_federated()
    }

    /// `source.table`
    pub fn qualified_name(&self) -> String {
        format!("{}{}{}", self.source_id, SOURCE_SEPARATOR, self.table)
    }
}

/// Registry of tables, keyed case-insensitively by `source.table`
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    tables: BTreeMap<String, RegisteredTable>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source_id.table`; fails if the key is taken
    pub fn register(
        &mut self,
        source_id: &str,
        table: &str,
        source: Arc<dyn DataSource>,
    ) -> FederationResult<()> {
        if source_id.is_empty() || table.is_empty() {
            return Err(FederationError::Catalog(
                "source id and table name must be non-empty".to_string(),
            ));
        }
        let key = Self::key(source_id, table);
        if self.tables.contains_key(&key) {
            return Err(FederationError::Catalog(format!(
                "Table '{}{}{}' already registered",
                source_id, SOURCE_SEPARATOR, table
            )));
        }
        self.tables.insert(
            key,
            RegisteredTable {
                source_id: source_id.to_string(),
                table: table.to_string(),
                source,
            },
        );
        Ok(())
    }

    /// Resolve a table reference. Without a source id the table name must be unique.
    pub fn resolve(&self, source_id: Option<&str>, table: &str) -> FederationResult<&RegisteredTable> {
        match source_id {
            Some(source_id) => self.tables.get(&Self::key(source_id, table)).ok_or_else(|| {
                FederationError::UnresolvedRelation(format!(
                    "{}{}{}",
                    source_id, SOURCE_SEPARATOR, table
                ))
            }),
            None => {
                let wanted = normalize_identifier(table);
                let mut matches = self
                    .tables
                    .values()
                    .filter(|t| normalize_identifier(&t.table) == wanted);
                match (matches.next(), matches.next()) {
                    (Some(found), None) => Ok(found),
                    (None, _) => Err(FederationError::UnresolvedRelation(table.to_string())),
                    (Some(first), Some(second)) => Err(FederationError::UnresolvedRelation(format!(
                        "{} is ambiguous ({} or {})",
                        table,
                        first.qualified_name(),
                        second.qualified_name()
                    ))),
                }
            }
        }
    }

    /// Registered tables, ordered by key
    pub fn tables(&self) -> impl Iterator<Item = &RegisteredTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn key(source_id: &str, table: &str) -> String {
        format!(
            "{}{}{}",
            normalize_identifier(source_id),
            SOURCE_SEPARATOR,
            normalize_identifier(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(federated: bool) -> Arc<dyn DataSource> {
        Arc::new(MemorySource::new(vec!["id".into()], Vec::new(), federated).unwrap())
    }

    #[test]
    fn test_resolve_case_insensitive_and_bare() {
        let mut registry = SourceRegistry::new();
        registry.register("CRM", "Deals", source(true)).unwrap();
        registry.register("local", "users", source(false)).unwrap();

        let deals = registry.resolve(Some("crm"), "DEALS").unwrap();
        assert_eq!(deals.qualified_name(), "CRM.Deals");
        assert!(deals.is_federated());
        assert!(!registry.resolve(None, "users").unwrap().is_federated());
    }

    #[test]
    fn test_resolve_errors() {
        let mut registry = SourceRegistry::new();
        registry.register("a", "t", source(true)).unwrap();
        registry.register("b", "t", source(true)).unwrap();

        assert!(matches!(
            registry.resolve(None, "t"),
            Err(FederationError::UnresolvedRelation(_))
        ));
        assert!(matches!(
            registry.resolve(Some("c"), "t"),
            Err(FederationError::UnresolvedRelation(_))
        ));
        assert!(matches!(
            registry.register("A", "T", source(false)),
            Err(FederationError::Catalog(_))
        ));
    }
}
