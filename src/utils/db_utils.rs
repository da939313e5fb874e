use actix_web::error::ErrorBadRequest;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use sqlx::{MySql, Transaction};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn to_sql_value(value: &Value) -> Result<SqlValue, actix_web::Error> {
    Ok(match value {
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
            if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(ErrorBadRequest("Unsupported numeric value"));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(ErrorBadRequest("Unsupported JSON value type")),
    })
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may appear in the payload; column names are
/// never taken from user input verbatim.
pub fn build_update_sql(
    table: &str,
    payload: &Map<String, Value>,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    if payload.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(payload.len());
    let mut values = Vec::with_capacity(payload.len() + 1);

    for (key, value) in payload {
        let column = allowed
            .iter()
            .find(|c| **c == key.as_str())
            .ok_or_else(|| ErrorBadRequest(format!("Field '{key}' cannot be updated")))?;
        columns.push(format!("{column} = ?"));
        values.push(to_sql_value(value)?);
    }

    let sql = format!(
        "UPDATE {} SET {}, updated_at = NOW() WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(
    tx: &mut Transaction<'_, MySql>,
    update: SqlUpdate,
) -> Result<u64, sqlx::Error> {
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
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(&mut **tx).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn builds_set_clause_for_allowed_columns() {
        let payload = object(json!({ "full_name": "Jane", "phone_number": null }));
        let update =
            build_update_sql("users", &payload, &["full_name", "phone_number"], "user_id", 9).unwrap();

        assert!(update.sql.starts_with("UPDATE users SET "));
        assert!(update.sql.contains("full_name = ?"));
        assert!(update.sql.ends_with("WHERE user_id = ?"));
        assert_eq!(update.values.len(), 3);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn rejects_unknown_columns() {
        let payload = object(json!({ "role_id": 1 }));
        assert!(build_update_sql("users", &payload, &["full_name"], "user_id", 1).is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(build_update_sql("users", &Map::new(), &["full_name"], "user_id", 1).is_err());
    }

    #[test]
    fn parses_dates_from_strings() {
        assert_eq!(
            to_sql_value(&json!("2025-03-01")).unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        );
        assert_eq!(to_sql_value(&json!("hello")).unwrap(), SqlValue::String("hello".into()));
        assert!(to_sql_value(&json!([1, 2])).is_err());
    }
}
