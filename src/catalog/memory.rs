//! In-memory table source
//!
//! Serves either as a federated source (honours projection, filters and the
//! limit hint, and logs every request) or as a local table.

use crate::catalog::{DataSource, FetchRequest};
use crate::common::error::{FederationError, FederationResult};
use crate::types::{Relation, Value};
use parking_lot::Mutex;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct MemorySource {
    data: Relation,
    federated: bool,
    fetch_log: Mutex<Vec<FetchRequest>>,
}

impl MemorySource {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, federated: bool) -> FederationResult<Self> {
        Ok(Self::from_relation(Relation::new(columns, rows)?, federated))
    }

    pub fn from_relation(data: Relation, federated: bool) -> Self {
        Self {
            data,
            federated,
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    /// Load a CSV file with a header row; cells are typed by [`Value::parse_text`]
    pub fn from_csv<P: AsRef<Path>>(path: P, federated: bool) -> FederationResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse_text).collect());
        }

        debug!(
            path = %path.as_ref().display(),
            rows = rows.len(),
            "loaded CSV table"
        );
        Self::new(columns, rows, federated)
    }

    /// Requests served so far, oldest first
    pub fn fetch_log(&self) -> Vec<FetchRequest> {
        self.fetch_log.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().len()
    }

    pub fn data(&self) -> &Relation {
        &self.data
    }
}

impl DataSource for MemorySource {
    fn is_federated(&self) -> bool {
        self.federated
    }

    fn get_columns(&self) -> Vec<String> {
        self.data.columns.clone()
    }

    fn fetch(&self, request: &FetchRequest) -> FederationResult<Relation> {
        self.fetch_log.lock().push(request.clone());

        let filters = request
            .filters
            .iter()
            .map(|filter| {
                self.data
                    .column_index(&filter.column)
                    .map(|idx| (idx, filter))
                    .ok_or_else(|| {
                        FederationError::Source(format!(
                            "{}: unknown filter column '{}'",
                            request.table, filter.column
                        ))
                    })
            })
            .collect::<FederationResult<Vec<_>>>()?;

        let mut rows = Vec::new();
        for row in &self.data.rows {
            if let Some(limit) = request.limit {
                if rows.len() >= limit {
                    break;
                }
            }
            let mut keep = true;
            for (idx, filter) in &filters {
                if !filter.evaluate(&row[*idx])? {
                    keep = false;
                    break;
                }
            }
            if keep {
                rows.push(row.clone());
            }
        }

        let matched = Relation {
            columns: self.data.columns.clone(),
            rows,
        };
        matched.project(&request.columns).map_err(|e| {
            FederationError::Source(format!("{}: {}", request.table, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LiteralValue;
    use crate::planner::filters::{FilterCondition, FilterOperator, FilterValue};
    use std::io::Write;

    fn deals() -> MemorySource {
        MemorySource::new(
            vec!["id".into(), "stage".into(), "amount".into()],
            vec![
                vec![Value::BigInt(1), Value::from("won"), Value::BigInt(500)],
                vec![Value::BigInt(2), Value::from("lost"), Value::BigInt(50)],
                vec![Value::BigInt(3), Value::from("won"), Value::BigInt(20)],
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_fetch_applies_filters_projection_and_limit() {
        let source = deals();
        let request = FetchRequest {
            table: "deals".into(),
            columns: vec!["amount".into(), "id".into()],
            filters: vec![FilterCondition::new(
                "stage",
                FilterOperator::Eq,
                FilterValue::Scalar(LiteralValue::String("won".into())),
            )],
            limit: None,
        };
        let result = source.fetch(&request).unwrap();
        assert_eq!(result.columns, vec!["amount", "id"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::BigInt(500), Value::BigInt(1)],
                vec![Value::BigInt(20), Value::BigInt(3)],
            ]
        );

        let limited = source
            .fetch(&FetchRequest {
                limit: Some(1),
                ..request.clone()
            })
            .unwrap();
        assert_eq!(limited.row_count(), 1);
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(source.fetch_log()[0], request);
    }

    #[test]
    fn test_fetch_rejects_unknown_columns() {
        let source = deals();
        let request = FetchRequest {
            table: "deals".into(),
            columns: vec!["missing".into()],
            filters: Vec::new(),
            limit: None,
        };
        assert!(matches!(source.fetch(&request), Err(FederationError::Source(_))));
    }

    #[test]
    fn test_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id, name, score").unwrap();
        writeln!(file, "1, Ada, 9.5").unwrap();
        writeln!(file, "2, Grace,").unwrap();

        let source = MemorySource::from_csv(file.path(), false).unwrap();
        assert!(!source.is_federated());
        assert_eq!(source.get_columns(), vec!["id", "name", "score"]);
        assert_eq!(source.data().rows[0][2], Value::Double(9.5));
        assert_eq!(source.data().rows[1][2], Value::Null);
    }
}
