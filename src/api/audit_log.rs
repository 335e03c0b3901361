use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    model::{audit::AuditLogEntry, role::Permission},
    utils::{
        db_utils::{BindFilters, FilterValue, Filters},
        pagination::PageParams,
    },
};

const AUDIT_SELECT: &str = r#"
    SELECT a.id, a.table_name, a.record_id, a.action, a.user_id,
           u.display_name AS user_name, a.old_data, a.new_data, a.created_at
    FROM audit_log a
    LEFT JOIN users u ON u.id = a.user_id
"#;

#[derive(Deserialize, IntoParams)]
pub struct AuditQuery {
    pub table_name: Option<String>,
    pub record_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub data: Vec<AuditLogEntry>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/audit-log",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit trail, newest first", body = AuditLogResponse),
        (status = 403, description = "Missing audit_log.view")
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn list_audit_log(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AuditQuery>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AuditLogView)?;

    let page = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();

    let mut filters = Filters::new();
    if let Some(table) = query.table_name.as_deref().filter(|t| !t.is_empty()) {
        filters.add("a.table_name = ?", [FilterValue::Str(table.to_string())]);
    }
    if let Some(record_id) = query.record_id {
        filters.add("a.record_id = ?", [FilterValue::U64(record_id)]);
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM audit_log a {where_clause}");
    debug!(sql = %count_sql, bindings = ?filters.values(), "Counting audit rows");
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_filters(filters.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!("{AUDIT_SELECT} {where_clause} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?");
    let data = sqlx::query_as::<_, AuditLogEntry>(&data_sql)
        .bind_filters(filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(AuditLogResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}
