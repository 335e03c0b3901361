use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool};

use crate::error::{ApiError, ApiResult};

/// Value bound into a dynamically built statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(Value),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Build `UPDATE {table} SET ... WHERE {id_column} = ?` from a JSON object.
///
/// Only keys in `allowed` become columns; anything else is a 400. Tables
/// with an `updated_at` column pass `touch = true` so it is stamped.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
    touch: bool,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len() + 1);
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        if !allowed.contains(&key.as_str()) {
            return Err(ApiError::bad_request(format!("Field '{key}' cannot be updated")));
        }
        columns.push(format!("{key} = ?"));
        values.push(to_sql_value(value));
    }

    if touch {
        columns.push("updated_at = NOW()".to_string());
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Serialize a typed patch (fields with `skip_serializing_if = "Option::is_none"`)
/// and build the update from it.
pub fn build_update_from<T: Serialize>(
    table: &str,
    patch: &T,
    allowed: &[&str],
    id_value: u64,
    touch: bool,
) -> ApiResult<SqlUpdate> {
    let payload = serde_json::to_value(patch).map_err(|e| ApiError::Internal(e.into()))?;
    build_update_sql(table, &payload, allowed, "id", id_value, touch)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else {
                SqlValue::F64(n.as_f64().unwrap_or_default())
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        Value::Array(_) | Value::Object(_) => SqlValue::Json(value.clone()),
    }
}

/// Run the update and return the number of affected rows.
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(Json(v)),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Typed value for a dynamic WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    U64(u64),
    I64(i64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
}

/// Accumulates `AND`-joined conditions and their bindings, in order.
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<FilterValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition with one placeholder per value.
    pub fn add(&mut self, condition: &str, values: impl IntoIterator<Item = FilterValue>) {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
    }

    /// Condition without placeholders.
    pub fn add_raw(&mut self, condition: &str) {
        self.conditions.push(condition.to_string());
    }

    pub fn values(&self) -> &[FilterValue] {
        &self.values
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }
}

pub trait BindFilters: Sized {
    fn bind_filter(self, value: &FilterValue) -> Self;

    fn bind_filters(self, values: &[FilterValue]) -> Self {
        values.iter().fold(self, |q, v| q.bind_filter(v))
    }
}

macro_rules! impl_bind_filters {
    ($ty:ty $(, $generic:ident)?) => {
        impl<'q $(, $generic)?> BindFilters for $ty {
            fn bind_filter(self, value: &FilterValue) -> Self {
                match value {
                    FilterValue::U64(v) => self.bind(*v),
                    FilterValue::I64(v) => self.bind(*v),
                    FilterValue::Str(v) => self.bind(v.clone()),
                    FilterValue::Bool(v) => self.bind(*v),
                    FilterValue::Date(v) => self.bind(*v),
                }
            }
        }
    };
}

impl_bind_filters!(Query<'q, MySql, MySqlArguments>);
impl_bind_filters!(QueryAs<'q, MySql, O, MySqlArguments>, O);
impl_bind_filters!(QueryScalar<'q, MySql, O, MySqlArguments>, O);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["first_name", "start_date", "active", "mandatory_for_roles", "notes"];

    #[test]
    fn builds_set_clause_in_key_order() {
        let payload = json!({ "first_name": "Ann", "active": false });
        let update = build_update_sql("employees", &payload, ALLOWED, "id", 7, true).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE employees SET active = ?, first_name = ?, updated_at = NOW() WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::Bool(false),
                SqlValue::String("Ann".into()),
                SqlValue::U64(7)
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_allow_list() {
        let payload = json!({ "id": 1, "first_name": "x" });
        let err = build_update_sql("employees", &payload, ALLOWED, "id", 1, false).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("'id'")));

        let payload = json!({ "first_name = 'x'; --": 1 });
        assert!(build_update_sql("employees", &payload, ALLOWED, "id", 1, false).is_err());
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("t", &json!({}), ALLOWED, "id", 1, false).is_err());
        assert!(build_update_sql("t", &json!([1, 2]), ALLOWED, "id", 1, false).is_err());
    }

    #[test]
    fn converts_dates_json_and_nulls() {
        let payload = json!({
            "start_date": "2026-02-01",
            "mandatory_for_roles": ["Cook"],
            "notes": null
        });
        let update = build_update_sql("t", &payload, ALLOWED, "id", 3, false).unwrap();
        assert_eq!(update.values[0], SqlValue::Json(json!(["Cook"])));
        assert_eq!(update.values[1], SqlValue::Null);
        assert_eq!(
            update.values[2],
            SqlValue::Date(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
        );
    }

    #[test]
    fn filters_join_conditions_in_order() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_clause(), "");

        filters.add_raw("e.active = 1");
        filters.add("e.department = ?", [FilterValue::Str("Oak".into())]);
        filters.add(
            "(e.first_name LIKE ? OR e.email LIKE ?)",
            [FilterValue::Str("%jo%".into()), FilterValue::Str("%jo%".into())],
        );

        assert_eq!(
            filters.where_clause(),
            "WHERE e.active = 1 AND e.department = ? AND (e.first_name LIKE ? OR e.email LIKE ?)"
        );
        assert_eq!(filters.values().len(), 3);
    }

    #[test]
    fn typed_patch_skips_absent_fields() {
        #[derive(Serialize)]
        struct Patch {
            #[serde(skip_serializing_if = "Option::is_none")]
            first_name: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            notes: Option<String>,
        }

        let patch = Patch { first_name: None, notes: Some("moved house".into()) };
        let update = build_update_from("employees", &patch, ALLOWED, 9, false).unwrap();
        assert_eq!(update.sql, "UPDATE employees SET notes = ? WHERE id = ?");

        let empty = Patch { first_name: None, notes: None };
        assert!(build_update_from("employees", &empty, ALLOWED, 9, false).is_err());
    }
}
