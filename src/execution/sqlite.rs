//! SQLite local engine
//!
//! Every call opens a private in-memory database, loads the inputs as
//! untyped tables and runs the statement, so concurrent steps share nothing.

use crate::common::error::{FederationError, FederationResult};
use crate::common::helper::quote_identifier;
use crate::execution::LocalEngine;
use crate::types::{Relation, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteEngine;

impl SqliteEngine {
    pub fn new() -> Self {
        Self
    }
}

impl LocalEngine for SqliteEngine {
    fn execute(&self, sql: &str, inputs: &[(String, &Relation)]) -> FederationResult<Relation> {
        let conn = Connection::open_in_memory()?;
        for (name, relation) in inputs {
            load_relation(&conn, name, relation)?;
        }

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut result = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(from_sql(row.get_ref(index)?));
            }
            result.push(values);
        }

        trace!(rows = result.len(), "sqlite statement finished");
        Relation::new(columns, result)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// Create `name` and copy the relation's rows into it
fn load_relation(conn: &Connection, name: &str, relation: &Relation) -> FederationResult<()> {
    if relation.columns.is_empty() {
        return Err(FederationError::Execution(format!(
            "relation '{}' has no columns",
            name
        )));
    }

    let columns = unique_column_names(&relation.columns);
    let definition: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    conn.execute(
        &format!(
            "CREATE TABLE {} ({})",
            quote_identifier(name),
            definition.join(", ")
        ),
        [],
    )?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_identifier(name),
            placeholders
        ))?;
        for row in &relation.rows {
            insert.execute(params_from_iter(row.iter().map(to_sql)))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// SQLite rejects duplicate column names; later duplicates get `_1`, `_2`, ...
fn unique_column_names(columns: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(columns.len());
    for column in columns {
        let mut candidate = column.clone();
        let mut suffix = 1;
        while names.iter().any(|n| n.eq_ignore_ascii_case(&candidate)) {
            candidate = format!("{}_{}", column, suffix);
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
        Value::BigInt(v) => SqlValue::Integer(*v),
        Value::Double(v) => SqlValue::Real(*v),
        Value::Varchar(v) => SqlValue::Text(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::BigInt(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Varchar(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deals() -> Relation {
        Relation::new(
            vec!["id".into(), "stage".into(), "amount".into()],
            vec![
                vec![Value::BigInt(1), Value::from("won"), Value::Double(10.5)],
                vec![Value::BigInt(2), Value::from("lost"), Value::Null],
                vec![Value::BigInt(3), Value::from("won"), Value::Double(4.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_query_over_input() {
        let deals = deals();
        let result = SqliteEngine::new()
            .execute(
                "SELECT \"id\", \"amount\" FROM \"step_0\" AS \"d\" WHERE \"stage\" = 'won' ORDER BY \"amount\" DESC",
                &[("step_0".to_string(), &deals)],
            )
            .unwrap();
        assert_eq!(result.columns, vec!["id", "amount"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::BigInt(1), Value::Double(10.5)],
                vec![Value::BigInt(3), Value::Double(4.0)],
            ]
        );
    }

    #[test]
    fn test_nulls_and_duplicate_columns() {
        let joined = Relation::new(
            vec!["id".into(), "id".into()],
            vec![vec![Value::BigInt(1), Value::Null]],
        )
        .unwrap();
        let result = SqliteEngine::new()
            .execute(
                "SELECT \"id\", \"id_1\" FROM \"j\"",
                &[("j".to_string(), &joined)],
            )
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::BigInt(1), Value::Null]]);
    }

    #[test]
    fn test_sql_error_is_execution_error() {
        let result = SqliteEngine::new().execute("SELECT * FROM \"missing\"", &[]);
        assert!(matches!(result, Err(FederationError::Execution(_))));
    }

    #[test]
    fn test_unique_column_names() {
        let names = unique_column_names(&["a".into(), "A".into(), "a_1".into()]);
        assert_eq!(names, vec!["a", "A_1", "a_1_1"]);
    }
}
