use crate::app::ports::TableStorePort;
use crate::envelope::Row;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Column stamped on every appended row
pub const INGESTED_AT_COLUMN: &str = "_ingested_at";

/// Append-only table store backed by SQLite.
///
/// `dataset.table` maps to the SQLite table `<dataset>__<table>`. Columns are
/// created on demand as new row keys show up; scalars keep their SQLite type
/// and nested values are stored as JSON text.
pub struct SqliteTableStore {
    conn: Mutex<Connection>,
}

fn load_err(e: rusqlite::Error) -> IngestError {
    IngestError::load(format!("sqlite: {}", e))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn physical_table(dataset: &str, table: &str) -> Result<String> {
    let valid = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !valid(dataset) || !valid(table) {
        return Err(IngestError::load(format!(
            "invalid table reference '{}.{}' (use [A-Za-z0-9_])",
            dataset, table
        )));
    }
    Ok(format!("{}__{}", dataset, table))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

impl SqliteTableStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref()).map_err(load_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(load_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(load_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IngestError::load("sqlite connection lock poisoned"))
    }

    fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(load_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(load_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(load_err)?;
        Ok(names)
    }

    /// Column names of `dataset.table` in creation order (empty if absent).
    pub fn columns(&self, dataset: &str, table: &str) -> Result<Vec<String>> {
        let name = physical_table(dataset, table)?;
        let conn = self.lock()?;
        Self::existing_columns(&conn, &name)
    }

    /// All rows in insertion order, read back as JSON objects.
    pub fn rows(&self, dataset: &str, table: &str) -> Result<Vec<Row>> {
        let name = physical_table(dataset, table)?;
        let conn = self.lock()?;
        if Self::existing_columns(&conn, &name)?.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(&name)))
            .map_err(load_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt
            .query_map([], |row| {
                let mut out = Row::new();
                for (i, col) in columns.iter().enumerate() {
                    out.insert(col.clone(), from_sql(row.get_ref(i)?));
                }
                Ok(out)
            })
            .map_err(load_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(load_err)?;
        Ok(rows)
    }

    pub fn row_count(&self, dataset: &str, table: &str) -> Result<usize> {
        Ok(self.rows(dataset, table)?.len())
    }

    fn append_blocking(&self, dataset: &str, table: &str, rows: &[Row]) -> Result<()> {
        let name = physical_table(dataset, table)?;
        let quoted = quote_ident(&name);
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(load_err)?;

        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL);",
            quoted,
            quote_ident(INGESTED_AT_COLUMN)
        ))
        .map_err(load_err)?;

        // SQLite column names are case-insensitive
        let mut known: HashSet<String> = Self::existing_columns(&tx, &name)?
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        for column in rows.iter().flat_map(|r| r.keys()) {
            if known.insert(column.to_ascii_lowercase()) {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    quoted,
                    quote_ident(column)
                ))
                .map_err(load_err)?;
            }
        }

        let ingested_at = chrono::Utc::now().to_rfc3339();
        for row in rows {
            let mut columns = vec![quote_ident(INGESTED_AT_COLUMN)];
            let mut values = vec![SqlValue::Text(ingested_at.clone())];
            for (key, value) in row {
                columns.push(quote_ident(key));
                values.push(to_sql(value));
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted,
                columns.join(", "),
                placeholders
            );
            tx.execute(&sql, params_from_iter(values.iter()))
                .map_err(load_err)?;
        }

        tx.commit().map_err(load_err)?;
        debug!("Appended {} rows to {}", rows.len(), name);
        Ok(())
    }
}

#[async_trait]
impl TableStorePort for SqliteTableStore {
    async fn append_rows(&self, dataset: &str, table: &str, rows: Vec<Row>) -> Result<()> {
        self.append_blocking(dataset, table, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn appends_and_grows_columns() {
        let store = SqliteTableStore::open_in_memory().unwrap();
        store
            .append_rows("brasil_api", "ibge_municipios", vec![row(json!({"nome": "Maceió", "trace_id": 7}))])
            .await
            .unwrap();
        store
            .append_rows(
                "brasil_api",
                "ibge_municipios",
                vec![row(json!({"nome": "Arapiraca", "codigo_ibge": "2700300", "trace_id": 7}))],
            )
            .await
            .unwrap();

        assert_eq!(
            store.columns("brasil_api", "ibge_municipios").unwrap(),
            vec!["_ingested_at", "nome", "trace_id", "codigo_ibge"]
        );
        let rows = store.rows("brasil_api", "ibge_municipios").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["nome"], json!("Maceió"));
        assert_eq!(rows[0]["codigo_ibge"], Value::Null);
        assert_eq!(rows[1]["trace_id"], json!(7));
    }

    #[tokio::test]
    async fn column_names_match_case_insensitively() {
        let store = SqliteTableStore::open_in_memory().unwrap();
        store.append_rows("d", "t", vec![row(json!({"Nome": "Maceió"}))]).await.unwrap();
        store
            .append_rows("d", "t", vec![row(json!({"nome": "Arapiraca"}))])
            .await
            .unwrap();
        store
            .append_rows("d", "t", vec![row(json!({"NOME": "Penedo"})), row(json!({"nome": "Coruripe"}))])
            .await
            .unwrap();

        assert_eq!(store.columns("d", "t").unwrap(), vec!["_ingested_at", "Nome"]);
        let names: Vec<Value> = store
            .rows("d", "t")
            .unwrap()
            .iter()
            .map(|r| r["Nome"].clone())
            .collect();
        assert_eq!(
            names,
            vec![json!("Maceió"), json!("Arapiraca"), json!("Penedo"), json!("Coruripe")]
        );
    }

    #[tokio::test]
    async fn reloading_appends_duplicates() {
        let store = SqliteTableStore::open_in_memory().unwrap();
        let batch = vec![row(json!({"a": 1}))];
        store.append_rows("d", "t", batch.clone()).await.unwrap();
        store.append_rows("d", "t", batch).await.unwrap();
        assert_eq!(store.row_count("d", "t").unwrap(), 2);
    }

    #[tokio::test]
    async fn nested_values_become_json_text() {
        let store = SqliteTableStore::open_in_memory().unwrap();
        store
            .append_rows("d", "t", vec![row(json!({"tags": ["x", "y"], "ok": true, "ratio": 0.5}))])
            .await
            .unwrap();
        let rows = store.rows("d", "t").unwrap();
        assert_eq!(rows[0]["tags"], json!("[\"x\",\"y\"]"));
        assert_eq!(rows[0]["ok"], json!(1));
        assert_eq!(rows[0]["ratio"], json!(0.5));
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let store = SqliteTableStore::open_in_memory().unwrap();
        let err = store
            .append_rows("d", "t; DROP TABLE x", vec![row(json!({"a": 1}))])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Load { .. }));
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("warehouse.db");
        {
            let store = SqliteTableStore::open(&path).unwrap();
            store.append_blocking("d", "t", &[row(json!({"a": 1}))]).unwrap();
        }
        let reopened = SqliteTableStore::open(&path).unwrap();
        assert_eq!(reopened.row_count("d", "t").unwrap(), 1);
    }
}
