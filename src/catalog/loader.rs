//! JSON catalog files
//!
//! ```json
//! { "tables": [
//!     { "source": "crm", "name": "deals", "federated": true,
//!       "columns": ["id", "stage"], "rows": [[1, "won"]] },
//!     { "source": "local", "name": "users", "federated": false, "csv": "users.csv" }
//! ] }
//! ```
//!
//! CSV paths are relative to the catalog file.

use crate::catalog::{MemorySource, SourceRegistry};
use crate::common::error::{FederationError, FederationResult};
use crate::types::Value;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TableEntry {
    pub source: String,
    pub name: String,
    #[serde(default = "default_federated")]
    pub federated: bool,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    pub csv: Option<PathBuf>,
}

fn default_federated() -> bool {
    true
}

/// Build a registry from a catalog file
pub fn load_catalog<P: AsRef<Path>>(path: P) -> FederationResult<SourceRegistry> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let registry = load_catalog_str(&text, base)?;
    info!(path = %path.display(), tables = registry.len(), "catalog loaded");
    Ok(registry)
}

/// Build a registry from catalog JSON; CSV paths resolve against `base`
pub fn load_catalog_str(json: &str, base: &Path) -> FederationResult<SourceRegistry> {
    let file: CatalogFile = serde_json::from_str(json)
        .map_err(|e| FederationError::Catalog(format!("invalid catalog: {}", e)))?;

    let mut registry = SourceRegistry::new();
    for entry in file.tables {
        let source = match &entry.csv {
            Some(csv) => {
                if !entry.rows.is_empty() {
                    return Err(FederationError::Catalog(format!(
                        "{}.{}: give either rows or csv, not both",
                        entry.source, entry.name
                    )));
                }
                let source = MemorySource::from_csv(base.join(csv), entry.federated)?;
                if !entry.columns.is_empty() && entry.columns != source.data().columns {
                    return Err(FederationError::Catalog(format!(
                        "{}.{}: declared columns {:?} differ from CSV header {:?}",
                        entry.source,
                        entry.name,
                        entry.columns,
                        source.data().columns
                    )));
                }
                source
            }
            None => MemorySource::new(entry.columns.clone(), entry.rows, entry.federated)
                .map_err(|e| FederationError::Catalog(format!("{}.{}: {}", entry.source, entry.name, e)))?,
        };
        registry.register(&entry.source, &entry.name, Arc::new(source))?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_rows_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = std::fs::File::create(dir.path().join("users.csv")).unwrap();
        writeln!(csv, "id,name").unwrap();
        writeln!(csv, "1,Ada").unwrap();

        let catalog = dir.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"{"tables": [
                {"source": "crm", "name": "deals", "columns": ["id", "amount"], "rows": [[1, 2.5], [2, null]]},
                {"source": "local", "name": "users", "federated": false, "csv": "users.csv"}
            ]}"#,
        )
        .unwrap();

        let registry = load_catalog(&catalog).unwrap();
        assert_eq!(registry.len(), 2);
        let deals = registry.resolve(Some("crm"), "deals").unwrap();
        assert!(deals.is_federated());
        assert_eq!(deals.source.get_columns(), vec!["id", "amount"]);
        let users = registry.resolve(None, "users").unwrap();
        assert!(!users.is_federated());
    }

    #[test]
    fn test_bad_catalogs() {
        let base = Path::new(".");
        assert!(matches!(
            load_catalog_str("{\"tables\": 3}", base),
            Err(FederationError::Catalog(_))
        ));
        assert!(matches!(
            load_catalog_str(
                r#"{"tables": [{"source": "a", "name": "t", "columns": ["x"], "rows": [[1, 2]]}]}"#,
                base
            ),
            Err(FederationError::Catalog(_))
        ));
    }
}
