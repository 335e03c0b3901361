use serde_json::Value;
use sqlx::MySqlPool;
use sqlx::types::Json;
use tracing::warn;

use crate::model::audit::AuditAction;

/// Append an audit row. Failures are logged and swallowed; the audited
/// write has already happened.
pub async fn record(
    pool: &MySqlPool,
    table: &str,
    record_id: u64,
    action: AuditAction,
    user_id: Option<u64>,
    old_data: Option<Value>,
    new_data: Option<Value>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (table_name, record_id, action, user_id, old_data, new_data)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(table)
    .bind(record_id)
    .bind(action.as_ref())
    .bind(user_id)
    .bind(old_data.map(Json))
    .bind(new_data.map(Json))
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(error = %e, table, record_id, action = %action, "Failed to write audit log");
    }
}
