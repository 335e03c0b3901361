use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, supervision::parse_period, today},
    auth::auth::AuthUser,
    compliance::{
        Period,
        supervision::{RequirementRule, required_count},
    },
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, role::Permission, supervision::SupervisionRequirement},
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateSupervisionRequirement {
    pub employee_id: u64,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub effective_from: NaiveDate,
    #[schema(example = 2)]
    pub required_count: i32,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateSupervisionRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(format = "date", value_type = Option<String>)]
    pub effective_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_count: Option<i32>,
}

const UPDATABLE: &[&str] = &["effective_from", "required_count"];

#[derive(Deserialize, IntoParams)]
pub struct RequirementQuery {
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct EffectiveQuery {
    pub employee_id: u64,
    /// `YYYY-MM`; defaults to the current month.
    pub period: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectiveRequirement {
    pub employee_id: u64,
    #[schema(value_type = String, example = "2026-10")]
    pub period: Period,
    pub required_count: i32,
    /// `false` when no requirement row applies and the default is used.
    pub configured: bool,
}

const SELECT: &str = "SELECT id, employee_id, effective_from, required_count, created_at, updated_at FROM supervision_requirements";

fn validate_count(count: i32) -> ApiResult<()> {
    if count < 0 {
        Err(ApiError::bad_request("required_count cannot be negative"))
    } else {
        Ok(())
    }
}

fn to_rules(rows: &[SupervisionRequirement]) -> Vec<RequirementRule> {
    rows.iter()
        .map(|r| RequirementRule {
            id: r.id,
            effective_from: r.effective_from,
            required_count: r.required_count,
        })
        .collect()
}

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<SupervisionRequirement> {
    sqlx::query_as::<_, SupervisionRequirement>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Supervision requirement"))
}

#[utoipa::path(
    get,
    path = "/api/supervision-requirements",
    params(RequirementQuery),
    responses((status = 200, description = "Requirements, latest effective first", body = Vec<SupervisionRequirement>)),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn list_requirements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequirementQuery>,
) -> ApiResult<HttpResponse> {
    let rows = match query.employee_id {
        Some(employee_id) => {
            sqlx::query_as::<_, SupervisionRequirement>(&format!(
                "{SELECT} WHERE employee_id = ? ORDER BY effective_from DESC, id DESC"
            ))
            .bind(employee_id)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, SupervisionRequirement>(&format!(
                "{SELECT} ORDER BY employee_id, effective_from DESC, id DESC"
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/supervision-requirements/effective",
    params(EffectiveQuery),
    responses(
        (status = 200, description = "Required supervisions for the month", body = EffectiveRequirement),
        (status = 400, description = "Malformed period")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn effective_requirement(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EffectiveQuery>,
) -> ApiResult<HttpResponse> {
    let period = match &query.period {
        Some(p) => parse_period(p)?,
        None => Period::containing(today()),
    };

    let rows = sqlx::query_as::<_, SupervisionRequirement>(&format!(
        "{SELECT} WHERE employee_id = ? AND effective_from <= ?"
    ))
    .bind(query.employee_id)
    .bind(period.first_day())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(EffectiveRequirement {
        employee_id: query.employee_id,
        period,
        required_count: required_count(&to_rules(&rows), period),
        configured: !rows.is_empty(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/supervision-requirements",
    request_body = CreateSupervisionRequirement,
    responses(
        (status = 201, description = "Requirement created", body = SupervisionRequirement),
        (status = 404, description = "Employee not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn create_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSupervisionRequirement>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    validate_count(payload.required_count)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let id = sqlx::query(
        "INSERT INTO supervision_requirements (employee_id, effective_from, required_count) VALUES (?, ?, ?)",
    )
    .bind(payload.employee_id)
    .bind(payload.effective_from)
    .bind(payload.required_count)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "supervision_requirements",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/supervision-requirements/{id}",
    params(("id" = u64, Path, description = "Requirement ID")),
    request_body = UpdateSupervisionRequirement,
    responses(
        (status = 200, description = "Requirement updated", body = SupervisionRequirement),
        (status = 404, description = "Requirement not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn update_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateSupervisionRequirement>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let id = path.into_inner();
    if let Some(count) = body.required_count {
        validate_count(count)?;
    }

    let before = fetch(pool.get_ref(), id).await?;
    let update = build_update_from("supervision_requirements", &*body, UPDATABLE, id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "supervision_requirements",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/supervision-requirements/{id}",
    params(("id" = u64, Path, description = "Requirement ID")),
    responses(
        (status = 204, description = "Requirement deleted"),
        (status = 404, description = "Requirement not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn delete_requirement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;

    sqlx::query("DELETE FROM supervision_requirements WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    audit::record(
        pool.get_ref(),
        "supervision_requirements",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::supervision::DEFAULT_REQUIRED_COUNT;
    use chrono::{TimeZone, Utc};

    fn row(id: u64, from: NaiveDate, count: i32) -> SupervisionRequirement {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        SupervisionRequirement {
            id,
            employee_id: 1,
            effective_from: from,
            required_count: count,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn rows_resolve_through_the_shared_rule() {
        let rows = [
            row(1, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 2),
            row(2, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 3),
        ];
        let period = Period::new(2026, 5).unwrap();
        assert_eq!(required_count(&to_rules(&rows), period), 3);
        assert_eq!(required_count(&to_rules(&[]), period), DEFAULT_REQUIRED_COUNT);
    }

    #[test]
    fn negative_counts_rejected() {
        assert!(validate_count(-1).is_err());
        assert!(validate_count(0).is_ok());
    }
}
