//! Parquet output via `DuckDB`.
//!
//! Rows are loaded into a typed table in an in-memory database and written
//! with `COPY ... (FORMAT PARQUET)`. The file is written next to the
//! target and renamed into place, so a failed write never clobbers a
//! previous output.

use std::path::Path;

use duckdb::Connection;
use duckdb::types::Value;
use species_map_occurrence_models::{Cell, Column, ColumnKind};

use crate::DbError;

/// Writes `rows` to a Parquet file at `path` with the given column layout.
///
/// Every row must have one cell per column. Returns the number of rows
/// written.
///
/// # Errors
///
/// Returns [`DbError`] if a row has the wrong width or the file cannot be
/// written.
pub fn write_parquet(
    path: &Path,
    columns: &[Column],
    rows: impl IntoIterator<Item = Vec<Cell>>,
) -> Result<u64, DbError> {
    if columns.is_empty() {
        return Err(DbError::Conversion {
            message: "cannot write a table without columns".to_string(),
        });
    }
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open_in_memory()?;
    let definitions: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name), sql_type(c.kind)))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE output ({});",
        definitions.join(", ")
    ))?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut count = 0_u64;
    {
        let mut stmt = conn.prepare(&format!("INSERT INTO output VALUES ({placeholders})"))?;
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbError::Conversion {
                    message: format!(
                        "row {i} has {} cells, expected {}",
                        row.len(),
                        columns.len()
                    ),
                });
            }
            stmt.execute(duckdb::params_from_iter(row.into_iter().map(to_value)))?;
            count += 1;
        }
    }

    let staging = path.with_extension("parquet.tmp");
    let written = conn
        .execute_batch(&format!(
            "COPY output TO {} (FORMAT PARQUET);",
            quote_literal(&staging.to_string_lossy())
        ))
        .map_err(DbError::from)
        .and_then(|()| std::fs::rename(&staging, path).map_err(DbError::from));
    if let Err(e) = written {
        if staging.exists()
            && let Err(cleanup) = std::fs::remove_file(&staging)
        {
            log::warn!("Failed to remove {}: {cleanup}", staging.display());
        }
        return Err(e);
    }

    log::info!("Wrote {count} rows to {}", path.display());
    Ok(count)
}

const fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Float => "DOUBLE",
        ColumnKind::Text => "VARCHAR",
        ColumnKind::Boolean => "BOOLEAN",
    }
}

fn to_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(v) => Value::BigInt(v),
        Cell::Float(v) => Value::Double(v),
        Cell::Text(v) => Value::Text(v),
        Cell::Boolean(v) => Value::Boolean(v),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
