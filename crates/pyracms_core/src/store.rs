use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;

use crate::model::{NewRow, Record};
use crate::runtime::ResolvedPaths;
use crate::schema::{ASSOCIATIONS, AssociationDef, MODELS, ModelDef, SCHEMA_SQL};
use crate::values::FieldValue;

/// One stored row, in declared column order.
pub type StoredRow = Vec<(&'static str, FieldValue)>;

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: usize,
}

pub fn open_connection(db_path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(busy_timeout)
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

/// Create the database file and every table if missing.
pub fn open_or_create(paths: &ResolvedPaths, busy_timeout: Duration) -> Result<Connection> {
    ensure_db_parent(paths)?;
    let connection = open_connection(&paths.db_path, busy_timeout)?;
    initialize_schema(&connection)?;
    Ok(connection)
}

/// Open an existing database. Returns `None` when the file or schema is absent.
pub fn open_existing(paths: &ResolvedPaths, busy_timeout: Duration) -> Result<Option<Connection>> {
    if !paths.db_path.exists() {
        return Ok(None);
    }
    let connection = open_connection(&paths.db_path, busy_timeout)?;
    if !table_exists(&connection, "entity")? {
        return Ok(None);
    }
    Ok(Some(connection))
}

pub fn initialize_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(SCHEMA_SQL)
        .context("failed to initialize schema")?;
    tracing::debug!(tables = MODELS.len() + ASSOCIATIONS.len(), "schema ready");
    Ok(())
}

/// Insert `row`, stamping `created` and `updated` when they are not set.
/// Returns the id of the new row.
pub fn insert_row(connection: &Connection, row: &NewRow) -> Result<i64> {
    let now = FieldValue::now();
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in row.model.columns {
        match row.values.get(column.name) {
            Some(value) => {
                columns.push(column.name);
                values.push(value.clone());
            }
            None if column.is_timestamp() => {
                columns.push(column.name);
                values.push(now.clone());
            }
            None => {}
        }
    }

    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({placeholders})",
        row.model.table,
        quote_columns(&columns)
    );
    connection
        .execute(&sql, params_from_iter(values.iter()))
        .with_context(|| format!("failed to insert {} row", row.model.name))?;

    let id = connection.last_insert_rowid();
    tracing::info!(model = row.model.name, id, "row inserted");
    Ok(id)
}

pub fn insert_record<R: Record>(connection: &Connection, record: &R) -> Result<i64> {
    let row = record.to_row()?;
    insert_row(connection, &row)
}

/// Update the given columns of one row. `updated` is always stamped with now
/// and cannot be supplied by the caller.
pub fn update_row(
    connection: &Connection,
    model: &'static ModelDef,
    id: i64,
    values: &BTreeMap<&'static str, FieldValue>,
) -> Result<()> {
    if let Some(unknown) = values.keys().find(|name| model.column(name).is_none()) {
        bail!("{} has no column `{unknown}`", model.name);
    }
    if values.contains_key("id") {
        bail!("{}.id cannot be changed", model.name);
    }
    if values.contains_key("updated") {
        bail!("{}.updated is stamped on every update", model.name);
    }

    let mut assignments = Vec::new();
    let mut bound = Vec::new();
    for column in model.editable_columns() {
        let value = match values.get(column.name) {
            Some(value) => value.clone(),
            None if column.name == "updated" => FieldValue::now(),
            None => continue,
        };
        bound.push(value);
        assignments.push(format!("\"{}\" = ?{}", column.name, bound.len()));
    }

    bound.push(FieldValue::Integer(id));
    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE id = ?{}",
        model.table,
        assignments.join(", "),
        bound.len()
    );
    let affected = connection
        .execute(&sql, params_from_iter(bound.iter()))
        .with_context(|| format!("failed to update {} row {id}", model.name))?;
    if affected == 0 {
        bail!("no {} row with id {id}", model.name);
    }
    tracing::info!(model = model.name, id, "row updated");
    Ok(())
}

/// Insert one link row into an association table.
pub fn link(
    connection: &Connection,
    association: &'static AssociationDef,
    values: &BTreeMap<&'static str, i64>,
) -> Result<()> {
    let mut bound = Vec::with_capacity(association.columns.len());
    for column in association.columns {
        let value = values.get(column.name).ok_or_else(|| {
            anyhow!("{} requires `{}`", association.table, column.name)
        })?;
        bound.push(*value);
    }
    let columns: Vec<&str> = association.columns.iter().map(|column| column.name).collect();
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({placeholders})",
        association.table,
        quote_columns(&columns)
    );
    connection
        .execute(&sql, params_from_iter(bound.iter()))
        .with_context(|| format!("failed to link {}", association.table))?;
    tracing::info!(association = association.table, "link inserted");
    Ok(())
}

/// Rows of `model` ordered by id. `limit` of `None` returns everything.
pub fn list_rows(
    connection: &Connection,
    model: &'static ModelDef,
    limit: Option<usize>,
) -> Result<Vec<StoredRow>> {
    let columns: Vec<&str> = model.columns.iter().map(|column| column.name).collect();
    let limit = match limit {
        Some(limit) => i64::try_from(limit).context("limit does not fit into i64")?,
        None => -1,
    };
    let sql = format!(
        "SELECT {} FROM \"{}\" ORDER BY id ASC LIMIT ?1",
        quote_columns(&columns),
        model.table
    );
    let mut statement = connection
        .prepare(&sql)
        .with_context(|| format!("failed to prepare {} listing", model.name))?;
    let mut rows = statement
        .query([limit])
        .with_context(|| format!("failed to list {} rows", model.name))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().context("failed to read row")? {
        let mut stored = Vec::with_capacity(model.columns.len());
        for (index, column) in model.columns.iter().enumerate() {
            let raw = row
                .get_ref(index)
                .with_context(|| format!("failed to read {}.{}", model.name, column.name))?;
            let value = FieldValue::from_sql_value(column.ty, raw)
                .with_context(|| format!("failed to decode {}.{}", model.name, column.name))?;
            stored.push((column.name, value));
        }
        out.push(stored);
    }
    Ok(out)
}

pub fn table_counts(connection: &Connection) -> Result<Vec<TableCount>> {
    let tables = MODELS
        .iter()
        .map(|model| model.table)
        .chain(ASSOCIATIONS.iter().map(|association| association.table));
    let mut out = Vec::new();
    for table in tables {
        let count: i64 = connection
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("failed to count {table}"))?;
        out.push(TableCount {
            table,
            rows: usize::try_from(count).context("count does not fit into usize")?,
        });
    }
    Ok(out)
}

fn quote_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ensure_db_parent(paths: &ResolvedPaths) -> Result<()> {
    let parent = paths
        .db_path
        .parent()
        .ok_or_else(|| anyhow!("db path has no parent: {}", paths.db_path.display()))?;
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
    Ok(exists == 1)
}
