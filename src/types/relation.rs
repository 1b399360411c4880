//! In-memory relation produced by a plan step

use crate::common::error::{FederationError, FederationResult};
use crate::types::Value;
use serde::{Deserialize, Serialize};

/// Rows with named columns. Immutable once a step has produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Relation {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> FederationResult<Self> {
        if let Some(bad) = rows.iter().position(|row| row.len() != columns.len()) {
            return Err(FederationError::InvalidArgument(format!(
                "row {} has {} values, expected {}",
                bad,
                rows[bad].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Get a specific value
    pub fn get_value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Values of one column, in row order
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Keep only `columns`, in the given order
    pub fn project(&self, columns: &[String]) -> FederationResult<Relation> {
        let indices = columns
            .iter()
            .map(|c| {
                self.column_index(c).ok_or_else(|| {
                    FederationError::InvalidArgument(format!("column '{}' not in relation", c))
                })
            })
            .collect::<FederationResult<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Relation {
            columns: columns.to_vec(),
            rows,
        })
    }

    /// Convert to a table-like string representation
    pub fn to_table_string(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let render = |values: &[String]| -> String {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{:<width$}", v, width = widths[i]))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        let mut result = render(&self.columns);
        result.push('\n');
        result.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &cells {
            result.push('\n');
            result.push_str(&render(row));
        }
        result
    }
}
