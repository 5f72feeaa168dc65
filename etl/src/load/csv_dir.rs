//! CSV-directory sink: one `<table>.csv` per table.
//!
//! Files are written into a staging directory next to the target files and
//! only moved into place once every table was written.

use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::Sink;
use crate::error::LoadResult;
use crate::models::Table;

pub struct CsvDirSink {
    dir: PathBuf,
}

impl CsvDirSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(file_name(table))
    }
}

fn file_name(table: &str) -> String {
    format!("{}.csv", table)
}

fn write_table(path: &Path, table: &Table) -> LoadResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

impl Sink for CsvDirSink {
    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }

    fn replace_tables(&mut self, tables: &[&Table]) -> LoadResult<()> {
        fs::create_dir_all(&self.dir)?;
        let staging = self.dir.join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir(&staging)?;

        let written = tables
            .iter()
            .try_for_each(|t| write_table(&staging.join(file_name(&t.name)), t));
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        for table in tables {
            let name = file_name(&table.name);
            fs::rename(staging.join(&name), self.dir.join(&name))?;
        }
        fs::remove_dir_all(&staging)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnRole, SqlType, Value};
    use tempfile::TempDir;

    fn table(name: &str, rows: Vec<Vec<Value>>) -> Table {
        Table {
            name: name.to_string(),
            columns: vec![
                Column::new("location_key", SqlType::Integer, ColumnRole::PrimaryKey),
                Column::new("city", SqlType::Text, ColumnRole::Attribute),
            ],
            rows,
        }
    }

    #[test]
    fn test_writes_one_file_per_table() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvDirSink::new(dir.path());
        let t = table(
            "dim_location",
            vec![
                vec![Value::Int(1), Value::from("SEATTLE")],
                vec![Value::Int(2), Value::from("Unknown")],
            ],
        );

        sink.replace_tables(&[&t]).unwrap();

        let content = fs::read_to_string(sink.table_path("dim_location")).unwrap();
        assert_eq!(content, "location_key,city\n1,SEATTLE\n2,Unknown\n");

        // Staging directory is gone
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_quotes_embedded_delimiters() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvDirSink::new(dir.path());
        let t = table(
            "dim_location",
            vec![vec![Value::Int(1), Value::from("KING, WA")]],
        );

        sink.replace_tables(&[&t]).unwrap();

        let content = fs::read_to_string(sink.table_path("dim_location")).unwrap();
        assert!(content.contains("\"KING, WA\""));
    }

    #[test]
    fn test_replace_overwrites_previous_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvDirSink::new(dir.path().join("out"));

        let first = table("dim_location", vec![vec![Value::Int(1), Value::from("A")]]);
        sink.replace_tables(&[&first]).unwrap();
        let second = table("dim_location", vec![vec![Value::Int(1), Value::from("B")]]);
        sink.replace_tables(&[&second]).unwrap();

        let content = fs::read_to_string(sink.table_path("dim_location")).unwrap();
        assert!(content.ends_with("1,B\n"));
    }
}
