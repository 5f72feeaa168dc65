//! Loader: persist the warehouse table set to a relational sink.
//!
//! The core hands over a [`Warehouse`]; the loader puts referenced tables
//! before the tables that reference them and passes the whole set to a
//! [`Sink`] in one call. A sink either replaces every table or leaves the
//! destination untouched.

pub mod csv_dir;
pub mod sqlite;

pub use csv_dir::CsvDirSink;
pub use sqlite::SqliteSink;

use serde::Serialize;

use crate::error::{LoadError, LoadResult};
use crate::logs::{log_info, log_success, log_success_indent};
use crate::models::{Table, Warehouse};

/// A destination that can replace a set of tables atomically.
pub trait Sink {
    /// Human-readable destination, for logs and reports.
    fn describe(&self) -> String;

    /// Drop and recreate every table in `tables`, in the given order, then
    /// insert their rows. All-or-nothing.
    fn replace_tables(&mut self, tables: &[&Table]) -> LoadResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub rows: usize,
}

/// What a load wrote, in load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub destination: String,
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Order tables so every table comes after the tables it references.
///
/// Tables without references keep their relative order. A reference to a
/// table outside the set (or a reference cycle) is an error.
pub fn order_tables(tables: &[Table]) -> LoadResult<Vec<&Table>> {
    for table in tables {
        for dep in table.dependencies() {
            if !tables.iter().any(|t| t.name == dep) {
                return Err(LoadError::MissingDependency {
                    table: table.name.clone(),
                    references: dep.to_string(),
                });
            }
        }
    }

    let mut ordered: Vec<&Table> = Vec::with_capacity(tables.len());
    let mut pending: Vec<&Table> = tables.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut rest = Vec::new();
        for table in pending {
            let ready = table
                .dependencies()
                .iter()
                .all(|dep| *dep == table.name || ordered.iter().any(|t| t.name == *dep));
            if ready {
                ordered.push(table);
            } else {
                rest.push(table);
            }
        }

        if rest.len() == before {
            let table = rest[0];
            let references = table
                .dependencies()
                .into_iter()
                .find(|dep| !ordered.iter().any(|t| t.name == *dep))
                .unwrap_or_default()
                .to_string();
            return Err(LoadError::MissingDependency {
                table: table.name.clone(),
                references,
            });
        }
        pending = rest;
    }

    Ok(ordered)
}

pub struct Loader<'s> {
    sink: &'s mut dyn Sink,
}

impl<'s> Loader<'s> {
    pub fn new(sink: &'s mut dyn Sink) -> Self {
        Self { sink }
    }

    /// Full refresh of every table in the warehouse.
    pub fn load(&mut self, warehouse: &Warehouse) -> LoadResult<LoadReport> {
        if warehouse.tables.is_empty() {
            return Err(LoadError::EmptyBatch);
        }

        let ordered = order_tables(&warehouse.tables)?;
        let destination = self.sink.describe();
        log_info(format!(
            "Loading {} tables into {}",
            ordered.len(),
            destination
        ));

        self.sink.replace_tables(&ordered)?;

        let tables: Vec<TableLoad> = ordered
            .iter()
            .map(|t| TableLoad {
                table: t.name.clone(),
                rows: t.rows.len(),
            })
            .collect();
        for t in &tables {
            log_success_indent(format!("{}: {} rows", t.table, t.rows), 1);
        }

        let report = LoadReport {
            destination,
            tables,
        };
        log_success(format!("Loaded {} rows", report.total_rows()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnRole, SqlType, Value};

    fn dim(name: &str) -> Table {
        Table {
            name: name.to_string(),
            columns: vec![Column::new("key", SqlType::Integer, ColumnRole::PrimaryKey)],
            rows: vec![vec![Value::Int(1)]],
        }
    }

    fn fact(refs: &[&str]) -> Table {
        Table {
            name: "fact".to_string(),
            columns: refs
                .iter()
                .map(|r| {
                    Column::new(
                        format!("{}_key", r),
                        SqlType::Integer,
                        ColumnRole::ForeignKey {
                            table: r.to_string(),
                            column: "key".to_string(),
                        },
                    )
                })
                .collect(),
            rows: vec![],
        }
    }

    /// Records what it was asked to write.
    #[derive(Default)]
    struct RecordingSink {
        written: Vec<String>,
    }

    impl Sink for RecordingSink {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn replace_tables(&mut self, tables: &[&Table]) -> LoadResult<()> {
            self.written = tables.iter().map(|t| t.name.clone()).collect();
            Ok(())
        }
    }

    #[test]
    fn test_dimensions_before_facts() {
        let tables = vec![fact(&["dim_a", "dim_b"]), dim("dim_a"), dim("dim_b")];
        let names: Vec<&str> = order_tables(&tables)
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["dim_a", "dim_b", "fact"]);
    }

    #[test]
    fn test_missing_dependency() {
        let tables = vec![dim("dim_a"), fact(&["dim_a", "dim_z"])];
        assert!(matches!(
            order_tables(&tables),
            Err(LoadError::MissingDependency { references, .. }) if references == "dim_z"
        ));
    }

    #[test]
    fn test_loader_refuses_empty_set() {
        let mut sink = RecordingSink::default();
        let result = Loader::new(&mut sink).load(&Warehouse { tables: vec![] });
        assert!(matches!(result, Err(LoadError::EmptyBatch)));
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_loader_report() {
        let mut sink = RecordingSink::default();
        let warehouse = Warehouse {
            tables: vec![fact(&["dim_a"]), dim("dim_a")],
        };

        let report = Loader::new(&mut sink).load(&warehouse).unwrap();

        assert_eq!(sink.written, vec!["dim_a", "fact"]);
        assert_eq!(report.destination, "memory");
        assert_eq!(report.tables[0], TableLoad { table: "dim_a".into(), rows: 1 });
        assert_eq!(report.total_rows(), 1);
    }
}
