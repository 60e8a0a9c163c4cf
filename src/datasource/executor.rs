// SPDX-License-Identifier: Apache-2.0

//! Parameterized query execution and schema introspection.
//!
//! Parameter substitution is textual template substitution, not prepared
//! statement binding: every `${name}` in the query text is replaced with the
//! literal parameter value. Query text originates from template authors, who
//! sit inside the trust boundary; end-user input is not sanitized here.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tiberius::ColumnData;

use crate::datasource::pool::{PoolBackend, PoolRegistry};
use crate::datasource::types::{ColumnInfo, DatasourceId, QueryOutput, Row, Value, Vendor};
use crate::error::{ReportError, ReportResult};

/// Replaces every `${name}` occurrence in `query` with the literal value
/// from `params`. Numbers are inserted bare, absent or null parameters
/// become `NULL`, everything else is single-quoted without escaping.
pub fn substitute_params(query: &str, params: &HashMap<String, serde_json::Value>) -> String {
    let pattern = Regex::new(r"\$\{(\w+)\}").expect("valid placeholder pattern");
    pattern
        .replace_all(query, |caps: &regex::Captures<'_>| {
            render_param(params.get(&caps[1]))
        })
        .into_owned()
}

fn render_param(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "NULL".to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => format!("'{}'", s),
        Some(other) => format!("'{}'", other),
    }
}

/// Runs read-only queries against pooled datasources.
pub struct QueryExecutor {
    registry: Arc<PoolRegistry>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    /// Substitutes `params` into `raw_query` and executes it, returning all
    /// rows materialized in memory. Execution failures surface as a single
    /// `QueryFailed` carrying the vendor message; no automatic retry.
    pub async fn execute(
        &self,
        id: DatasourceId,
        raw_query: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> ReportResult<QueryOutput> {
        let pool = self.registry.acquire(id).await?;
        let sql = substitute_params(raw_query, params);
        tracing::debug!(datasource = %id, "Executing report query");

        match &pool.backend {
            PoolBackend::Any(any_pool) => execute_any(any_pool, &sql).await,
            PoolBackend::SqlServer(mssql_pool) => execute_mssql(mssql_pool, &sql).await,
        }
    }

    /// Lists user table names, vendor-neutral where the vendor allows it.
    pub async fn list_tables(&self, id: DatasourceId) -> ReportResult<Vec<String>> {
        let pool = self.registry.acquire(id).await?;
        let sql = match pool.config.vendor {
            Vendor::MySql => {
                "SELECT TABLE_NAME FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY TABLE_NAME"
            }
            Vendor::Postgres => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' ORDER BY table_name"
            }
            Vendor::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Vendor::SqlServer => {
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            }
            other => return Err(ReportError::unsupported_vendor(other.as_str())),
        };

        let output = match &pool.backend {
            PoolBackend::Any(any_pool) => execute_any(any_pool, sql).await?,
            PoolBackend::SqlServer(mssql_pool) => execute_mssql(mssql_pool, sql).await?,
        };

        Ok(output
            .rows
            .iter()
            .filter_map(|row| match row.values.first() {
                Some(Value::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    /// Lists the columns of `table` as (name, declared type) pairs.
    pub async fn list_columns(
        &self,
        id: DatasourceId,
        table: &str,
    ) -> ReportResult<Vec<ColumnInfo>> {
        let pool = self.registry.acquire(id).await?;
        let escaped = table.replace('\'', "''");
        let sql = match pool.config.vendor {
            Vendor::MySql => format!(
                "SELECT COLUMN_NAME, DATA_TYPE FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = '{}' \
                 ORDER BY ORDINAL_POSITION",
                escaped
            ),
            Vendor::Postgres => format!(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = '{}' \
                 ORDER BY ordinal_position",
                escaped
            ),
            Vendor::Sqlite => format!("SELECT name, type FROM pragma_table_info('{}')", escaped),
            Vendor::SqlServer => format!(
                "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = '{}' ORDER BY ORDINAL_POSITION",
                escaped
            ),
            other => return Err(ReportError::unsupported_vendor(other.as_str())),
        };

        let output = match &pool.backend {
            PoolBackend::Any(any_pool) => execute_any(any_pool, &sql).await?,
            PoolBackend::SqlServer(mssql_pool) => execute_mssql(mssql_pool, &sql).await?,
        };

        Ok(output
            .rows
            .iter()
            .filter_map(|row| {
                let name = match row.values.first() {
                    Some(Value::Text(name)) => name.clone(),
                    _ => return None,
                };
                let data_type = match row.values.get(1) {
                    Some(Value::Text(t)) => t.clone(),
                    _ => String::new(),
                };
                Some(ColumnInfo { name, data_type })
            })
            .collect())
    }
}

// ==================== sqlx Any backend ====================

async fn execute_any(pool: &sqlx::AnyPool, sql: &str) -> ReportResult<QueryOutput> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ReportError::query_failed(e.to_string()))?;

    let columns = match rows.first() {
        Some(first) => first
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
            })
            .collect(),
        None => Vec::new(),
    };

    let rows = rows
        .iter()
        .map(|row| Row {
            values: (0..row.columns().len())
                .map(|i| decode_any_value(row, i))
                .collect(),
        })
        .collect();

    Ok(QueryOutput { columns, rows })
}

/// Typed try-get chain for the `Any` driver; falls back to `Null` when no
/// supported decoding applies.
fn decode_any_value(row: &sqlx::any::AnyRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    Value::Null
}

// ==================== Tiberius backend ====================

async fn execute_mssql(
    pool: &crate::datasource::pool::MssqlPool,
    sql: &str,
) -> ReportResult<QueryOutput> {
    let mut conn = pool.get().await.map_err(|e| {
        ReportError::connection_failed(format!("Failed to acquire connection: {e}"))
    })?;

    let stream = conn
        .simple_query(sql)
        .await
        .map_err(|e| ReportError::query_failed(e.to_string()))?;

    let result_set = stream
        .into_first_result()
        .await
        .map_err(|e| ReportError::query_failed(e.to_string()))?;

    let columns = match result_set.first() {
        Some(first) => first
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: format!("{:?}", col.column_type()),
            })
            .collect(),
        None => Vec::new(),
    };

    let rows = result_set.iter().map(convert_mssql_row).collect();

    Ok(QueryOutput { columns, rows })
}

fn convert_mssql_row(row: &tiberius::Row) -> Row {
    let values = row
        .cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            // Date/time types go through chrono via typed getters.
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::Text(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null),
            _ => convert_column_data(data),
        })
        .collect();
    Row { values }
}

fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::Numeric(Some(n)) => {
            let val = n.value() as f64 / 10f64.powi(n.scale() as i32);
            Value::Float(val)
        }
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Text(format!("{}", g)),
        ColumnData::Binary(Some(b)) => Value::Bytes(b.to_vec()),
        ColumnData::Xml(Some(xml)) => Value::Text(xml.to_string()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn numbers_are_substituted_bare() {
        let sql = substitute_params(
            "SELECT * FROM t WHERE id = ${id}",
            &params(&[("id", serde_json::json!(42))]),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE id = 42");
    }

    #[test]
    fn strings_are_quoted_without_escaping() {
        let sql = substitute_params(
            "SELECT * FROM t WHERE name = ${name}",
            &params(&[("name", serde_json::json!("O'Brien"))]),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE name = 'O'Brien'");
    }

    #[test]
    fn absent_and_null_params_become_null() {
        let sql = substitute_params(
            "WHERE a = ${missing} AND b = ${explicit}",
            &params(&[("explicit", serde_json::Value::Null)]),
        );
        assert_eq!(sql, "WHERE a = NULL AND b = NULL");
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let sql = substitute_params(
            "SELECT ${x}, ${x} FROM t",
            &params(&[("x", serde_json::json!(7))]),
        );
        assert_eq!(sql, "SELECT 7, 7 FROM t");
    }

    #[test]
    fn non_placeholder_dollars_are_untouched() {
        let sql = substitute_params("SELECT '$literal' FROM t", &params(&[]));
        assert_eq!(sql, "SELECT '$literal' FROM t");
    }
}
