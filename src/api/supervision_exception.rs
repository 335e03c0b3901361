use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, supervision::parse_period},
    auth::auth::AuthUser,
    compliance::supervision::ExceptionType,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, role::Permission, supervision::SupervisionException},
    utils::{
        audit,
        db_utils::{BindFilters, FilterValue, Filters},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateSupervisionException {
    pub employee_id: u64,
    #[schema(example = "2026-08")]
    pub period: String,
    pub exception_type: ExceptionType,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct ExceptionQuery {
    pub employee_id: Option<u64>,
    pub period: Option<String>,
}

const SELECT: &str = "SELECT id, employee_id, period, exception_type, notes, created_by, created_at FROM supervision_exceptions";

#[utoipa::path(
    get,
    path = "/api/supervision-exceptions",
    params(ExceptionQuery),
    responses((status = 200, description = "Exceptions by period", body = Vec<SupervisionException>)),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn list_exceptions(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ExceptionQuery>,
) -> ApiResult<HttpResponse> {
    let mut filters = Filters::new();
    if let Some(id) = query.employee_id {
        filters.add("employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(period) = &query.period {
        filters.add("period = ?", [FilterValue::Str(parse_period(period)?.to_string())]);
    }

    let rows = sqlx::query_as::<_, SupervisionException>(&format!(
        "{SELECT} {} ORDER BY period DESC, employee_id",
        filters.where_clause()
    ))
    .bind_filters(filters.values())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Add Exception
///
/// An employee has at most one exception per month.
#[utoipa::path(
    post,
    path = "/api/supervision-exceptions",
    request_body = CreateSupervisionException,
    responses(
        (status = 201, description = "Exception recorded", body = SupervisionException),
        (status = 400, description = "Malformed period or type"),
        (status = 409, description = "Month already has an exception")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn create_exception(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSupervisionException>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let period = parse_period(&payload.period)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let id = sqlx::query(
        r#"
        INSERT INTO supervision_exceptions (employee_id, period, exception_type, notes, created_by)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(period.to_string())
    .bind(payload.exception_type.as_ref())
    .bind(&payload.notes)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::conflict(format!("An exception already exists for {period}"))
        }
        other => other,
    })?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "supervision_exceptions",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    let row = sqlx::query_as::<_, SupervisionException>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Created().json(row))
}

#[utoipa::path(
    delete,
    path = "/api/supervision-exceptions/{id}",
    params(("id" = u64, Path, description = "Exception ID")),
    responses(
        (status = 204, description = "Exception removed"),
        (status = 404, description = "Exception not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn delete_exception(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM supervision_exceptions WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Supervision exception"));
    }

    audit::record(
        pool.get_ref(),
        "supervision_exceptions",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_unknown_exception_type() {
        let ok: CreateSupervisionException = serde_json::from_str(
            r#"{"employee_id":1,"period":"2026-08","exception_type":"sick_leave"}"#,
        )
        .unwrap();
        assert_eq!(ok.exception_type, ExceptionType::SickLeave);

        let bad = serde_json::from_str::<CreateSupervisionException>(
            r#"{"employee_id":1,"period":"2026-08","exception_type":"holiday"}"#,
        );
        assert!(bad.is_err());
    }
}
