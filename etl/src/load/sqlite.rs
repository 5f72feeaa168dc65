//! SQLite sink.
//!
//! One transaction per load: drop, recreate and fill every table, then
//! commit. If anything fails the transaction is dropped uncommitted and
//! SQLite rolls it back, so the previous tables survive intact.

use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::{Path, PathBuf};

use super::Sink;
use crate::error::LoadResult;
use crate::models::{ColumnRole, Table, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Decimal(d) => ToSqlOutput::from(*d),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

pub struct SqliteSink {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteSink {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    pub fn in_memory() -> LoadResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path: None })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `CREATE TABLE` statement with key and reference constraints.
pub fn create_table_sql(table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote(&c.name), c.sql_type.as_sql());
            match &c.role {
                ColumnRole::PrimaryKey => def.push_str(" PRIMARY KEY"),
                ColumnRole::ForeignKey { table, column } => {
                    def.push_str(&format!(" NOT NULL REFERENCES {}({})", quote(table), quote(column)))
                }
                ColumnRole::Attribute | ColumnRole::Measure => def.push_str(" NOT NULL"),
            }
            def
        })
        .collect();

    format!("CREATE TABLE {} ({})", quote(&table.name), columns.join(", "))
}

fn insert_sql(table: &Table) -> String {
    let names: Vec<String> = table.columns.iter().map(|c| quote(&c.name)).collect();
    let params: Vec<String> = (1..=table.columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&table.name),
        names.join(", "),
        params.join(", ")
    )
}

impl Sink for SqliteSink {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }

    fn replace_tables(&mut self, tables: &[&Table]) -> LoadResult<()> {
        let tx = self.conn.transaction()?;

        // Referencing tables go first so no drop trips a foreign key
        for table in tables.iter().rev() {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(&table.name)), [])?;
        }

        for table in tables {
            tx.execute(&create_table_sql(table), [])?;
            let mut stmt = tx.prepare(&insert_sql(table))?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, SqlType};
    use tempfile::TempDir;

    fn dim_cafv(rows: &[(i64, &str)]) -> Table {
        Table {
            name: "dim_cafv".to_string(),
            columns: vec![
                Column::new("cafv_key", SqlType::Integer, ColumnRole::PrimaryKey),
                Column::new("cafv_eligibility", SqlType::Text, ColumnRole::Attribute),
            ],
            rows: rows
                .iter()
                .map(|(k, v)| vec![Value::Int(*k), Value::from(*v)])
                .collect(),
        }
    }

    fn fact(keys: &[i64]) -> Table {
        Table {
            name: "fact".to_string(),
            columns: vec![
                Column::new(
                    "cafv_key",
                    SqlType::Integer,
                    ColumnRole::ForeignKey {
                        table: "dim_cafv".to_string(),
                        column: "cafv_key".to_string(),
                    },
                ),
                Column::new("base_msrp", SqlType::Real, ColumnRole::Measure),
            ],
            rows: keys
                .iter()
                .map(|k| vec![Value::Int(*k), Value::Decimal(0.0)])
                .collect(),
        }
    }

    fn count(sink: &SqliteSink, table: &str) -> i64 {
        sink.connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(&fact(&[]));
        assert!(sql.starts_with("CREATE TABLE \"fact\""));
        assert!(sql.contains("\"cafv_key\" INTEGER NOT NULL REFERENCES \"dim_cafv\"(\"cafv_key\")"));
        assert!(sql.contains("\"base_msrp\" REAL NOT NULL"));

        let sql = create_table_sql(&dim_cafv(&[]));
        assert!(sql.contains("\"cafv_key\" INTEGER PRIMARY KEY"));
    }

    #[test]
    fn test_replace_tables_writes_rows() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let dim = dim_cafv(&[(1, "Eligible"), (2, "Unknown")]);
        let fact = fact(&[1, 2, 2]);

        sink.replace_tables(&[&dim, &fact]).unwrap();

        assert_eq!(count(&sink, "dim_cafv"), 2);
        assert_eq!(count(&sink, "fact"), 3);
        let name: String = sink
            .connection()
            .query_row(
                "SELECT cafv_eligibility FROM dim_cafv WHERE cafv_key = 2",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(name, "Unknown");
    }

    #[test]
    fn test_full_refresh_replaces_previous_rows() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let dim = dim_cafv(&[(1, "Eligible"), (2, "Unknown")]);
        sink.replace_tables(&[&dim, &fact(&[1, 2])]).unwrap();

        let dim = dim_cafv(&[(1, "Not eligible")]);
        sink.replace_tables(&[&dim, &fact(&[1])]).unwrap();

        assert_eq!(count(&sink, "dim_cafv"), 1);
        assert_eq!(count(&sink, "fact"), 1);
    }

    #[test]
    fn test_failed_load_keeps_prior_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warehouse.db");

        let mut sink = SqliteSink::open(&path).unwrap();
        let dim = dim_cafv(&[(1, "Eligible")]);
        sink.replace_tables(&[&dim, &fact(&[1, 1])]).unwrap();

        // Duplicate primary key fails mid-load
        let broken = dim_cafv(&[(1, "A"), (1, "B")]);
        assert!(sink.replace_tables(&[&broken, &fact(&[1])]).is_err());

        let reopened = SqliteSink::open(&path).unwrap();
        assert_eq!(count(&reopened, "dim_cafv"), 1);
        assert_eq!(count(&reopened, "fact"), 2);
    }

    #[test]
    fn test_orphan_reference_rejected() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let dim = dim_cafv(&[(1, "Eligible")]);
        assert!(sink.replace_tables(&[&dim, &fact(&[7])]).is_err());
    }
}
