use actix_web::{HttpResponse, web};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        training_course::COURSE_SELECT,
        training_record::{TrainingStatusRow, load_status_rows},
    },
    auth::auth::AuthUser,
    compliance::training::TrainingStatus,
    error::ApiResult,
    model::{
        audit::AuditAction,
        notification::{NotificationLog, NotificationType, RecipientType},
        role::{Permission, Role},
        training::TrainingCourse,
    },
    utils::{audit, mailer::Mailer},
};

/// An expired or expiring completion that is due a reminder.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingNotification {
    pub employee_id: u64,
    pub employee_name: String,
    pub employee_email: String,
    pub course_id: u64,
    pub course_name: String,
    pub category: String,
    pub training_record_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub expiry_date: Option<NaiveDate>,
    pub days_until_expiry: Option<i64>,
    pub status: TrainingStatus,
    pub notify_employee: bool,
    pub notify_admin: bool,
    pub reminder_frequency_days: i32,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SendNotificationsResponse {
    pub emails_sent: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct LogQuery {
    /// Defaults to 100, at most 1000.
    pub limit: Option<u32>,
}

/// One email the dispatcher intends to send.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedEmail {
    pub training_record_id: u64,
    pub employee_id: u64,
    pub course_id: u64,
    pub recipient_email: String,
    pub recipient_type: RecipientType,
    pub notification_type: NotificationType,
    pub days_until_expiry: Option<i64>,
    pub reminder_frequency_days: i32,
    pub subject: String,
    pub body: String,
}

type DedupeKey = (u64, String, NotificationType);

impl PlannedEmail {
    fn key(&self) -> DedupeKey {
        (
            self.training_record_id,
            self.recipient_email.to_lowercase(),
            self.notification_type,
        )
    }
}

const DEFAULT_LOG_LIMIT: u32 = 100;
const MAX_LOG_LIMIT: u32 = 1000;

const LOG_SELECT: &str = r#"
    SELECT n.id, n.training_record_id, n.employee_id,
           CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
           n.course_id, c.name AS course_name,
           n.recipient_email, n.recipient_type, n.notification_type, n.sent_at, n.days_until_expiry
    FROM notification_log n
    LEFT JOIN employees e ON e.id = n.employee_id
    LEFT JOIN training_courses c ON c.id = n.course_id
"#;

pub(crate) fn pending_from(
    rows: Vec<TrainingStatusRow>,
    courses: &HashMap<u64, TrainingCourse>,
) -> Vec<PendingNotification> {
    let mut pending: Vec<PendingNotification> = rows
        .into_iter()
        .filter(|r| r.status.needs_attention())
        .filter_map(|r| {
            let course = courses.get(&r.course_id)?;
            Some(PendingNotification {
                employee_id: r.employee_id,
                employee_name: r.employee_name,
                employee_email: r.employee_email,
                course_id: r.course_id,
                course_name: r.course_name,
                category: r.category,
                training_record_id: r.training_record_id,
                expiry_date: r.expiry_date,
                days_until_expiry: r.days_until_expiry,
                status: r.status,
                notify_employee: course.notify_employee,
                notify_admin: course.notify_admin,
                reminder_frequency_days: course.reminder_frequency_days,
            })
        })
        .collect();
    pending.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });
    pending
}

fn subject_for(item: &PendingNotification) -> String {
    match item.status {
        TrainingStatus::Expired => format!("EXPIRED: {} - {}", item.employee_name, item.course_name),
        _ => format!("Expiring Soon: {} - {}", item.employee_name, item.course_name),
    }
}

fn body_for(item: &PendingNotification) -> String {
    let on = item
        .expiry_date
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default();
    match item.status {
        TrainingStatus::Expired => format!(
            "{}'s {} training expired on {on}. Immediate action required.",
            item.employee_name, item.course_name
        ),
        _ => format!(
            "{}'s {} training expires in {} days (on {on}). Please arrange renewal.",
            item.employee_name,
            item.course_name,
            item.days_until_expiry.unwrap_or_default()
        ),
    }
}

/// Expand pending items into one email per recipient. Items without a
/// completion record have nothing to renew and are skipped. An employee who
/// is also an admin gets a single copy.
pub(crate) fn plan_emails(pending: &[PendingNotification], admins: &[String]) -> Vec<PlannedEmail> {
    let mut planned = Vec::new();
    let mut seen: HashSet<DedupeKey> = HashSet::new();
    for item in pending {
        let Some(record_id) = item.training_record_id else { continue };
        let notification_type = match item.status {
            TrainingStatus::Expired => NotificationType::Expired,
            _ => NotificationType::ExpiryWarning,
        };

        let mut recipients: Vec<(String, RecipientType)> = Vec::new();
        if item.notify_employee {
            recipients.push((item.employee_email.clone(), RecipientType::Employee));
        }
        if item.notify_admin {
            recipients.extend(admins.iter().map(|a| (a.clone(), RecipientType::Admin)));
        }

        let subject = subject_for(item);
        let body = body_for(item);
        for (recipient_email, recipient_type) in recipients {
            let email = PlannedEmail {
                training_record_id: record_id,
                employee_id: item.employee_id,
                course_id: item.course_id,
                recipient_email,
                recipient_type,
                notification_type,
                days_until_expiry: item.days_until_expiry,
                reminder_frequency_days: item.reminder_frequency_days,
                subject: subject.clone(),
                body: body.clone(),
            };
            if seen.insert(email.key()) {
                planned.push(email);
            }
        }
    }
    planned
}

/// Whether the same reminder already went out within the course's window.
pub(crate) fn recently_sent(
    last_sent: &HashMap<DedupeKey, DateTime<Utc>>,
    email: &PlannedEmail,
    now: DateTime<Utc>,
) -> bool {
    last_sent
        .get(&email.key())
        .is_some_and(|sent| now - *sent < Duration::days(email.reminder_frequency_days.max(0) as i64))
}

async fn load_pending(pool: &MySqlPool) -> ApiResult<Vec<PendingNotification>> {
    let rows = load_status_rows(pool, None, None).await?;
    let courses: HashMap<u64, TrainingCourse> = sqlx::query_as::<_, TrainingCourse>(COURSE_SELECT)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    Ok(pending_from(rows, &courses))
}

#[utoipa::path(
    get,
    path = "/api/notifications/pending",
    responses((status = 200, description = "Expired and expiring completions, soonest first", body = Vec<PendingNotification>)),
    tag = "Notifications",
    security(("bearer_auth" = []))
)]
pub async fn list_pending(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_pending(pool.get_ref()).await?))
}

#[derive(sqlx::FromRow)]
struct LastSent {
    training_record_id: u64,
    recipient_email: String,
    notification_type: String,
    sent_at: DateTime<Utc>,
}

/// Send Reminders
///
/// Emails every due recipient once per reminder window and logs each send.
#[utoipa::path(
    post,
    path = "/api/notifications/send",
    responses((status = 200, description = "Dispatch summary", body = SendNotificationsResponse)),
    tag = "Notifications",
    security(("bearer_auth" = []))
)]
pub async fn send_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    mailer: web::Data<Mailer>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::NotificationsManage)?;

    let pending = load_pending(pool.get_ref()).await?;
    let admins = sqlx::query_scalar::<_, String>(
        "SELECT email FROM users WHERE role_id = ? AND active = 1 ORDER BY email",
    )
    .bind(Role::Admin.id())
    .fetch_all(pool.get_ref())
    .await?;

    let mut last_sent: HashMap<DedupeKey, DateTime<Utc>> = sqlx::query_as::<_, LastSent>(
        r#"
        SELECT training_record_id, recipient_email, notification_type, MAX(sent_at) AS sent_at
        FROM notification_log
        GROUP BY training_record_id, recipient_email, notification_type
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .filter_map(|r| {
        let kind = r.notification_type.parse::<NotificationType>().ok()?;
        Some(((r.training_record_id, r.recipient_email.to_lowercase(), kind), r.sent_at))
    })
    .collect();

    let now = Utc::now();
    let mut response = SendNotificationsResponse::default();
    for email in plan_emails(&pending, &admins) {
        if recently_sent(&last_sent, &email, now) {
            response.skipped += 1;
            continue;
        }

        if let Err(e) = mailer
            .send(&email.recipient_email, &email.subject, email.body.clone())
            .await
        {
            warn!(error = %e, to = %email.recipient_email, "Failed to send notification");
            response
                .errors
                .push(format!("Failed to send to {}", email.recipient_email));
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO notification_log
                (training_record_id, employee_id, course_id, recipient_email, recipient_type,
                 notification_type, days_until_expiry)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(email.training_record_id)
        .bind(email.employee_id)
        .bind(email.course_id)
        .bind(&email.recipient_email)
        .bind(email.recipient_type.as_ref())
        .bind(email.notification_type.as_ref())
        .bind(email.days_until_expiry.map(|d| d as i32))
        .execute(pool.get_ref())
        .await?;
        last_sent.insert(email.key(), now);
        response.emails_sent += 1;
    }

    info!(
        sent = response.emails_sent,
        skipped = response.skipped,
        failed = response.errors.len(),
        "Notification run finished"
    );
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    get,
    path = "/api/notifications/log",
    params(LogQuery),
    responses((status = 200, description = "Sent notifications, most recent first", body = Vec<NotificationLog>)),
    tag = "Notifications",
    security(("bearer_auth" = []))
)]
pub async fn list_log(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LogQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let rows = sqlx::query_as::<_, NotificationLog>(&format!(
        "{LOG_SELECT} ORDER BY n.sent_at DESC, n.id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/log",
    responses((status = 204, description = "Log cleared")),
    tag = "Notifications",
    security(("bearer_auth" = []))
)]
pub async fn clear_log(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require(Permission::NotificationsManage)?;

    let removed = sqlx::query("DELETE FROM notification_log")
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    info!(removed, "Notification log cleared");
    audit::record(
        pool.get_ref(),
        "notification_log",
        0,
        AuditAction::Delete,
        Some(auth.user_id),
        Some(serde_json::json!({ "rows": removed })),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::training_record::tests::{course, d};

    fn pending(record: Option<u64>, status: TrainingStatus, employee: bool, admin: bool) -> PendingNotification {
        PendingNotification {
            employee_id: 1,
            employee_name: "Ada Jones".into(),
            employee_email: "ada@example.com".into(),
            course_id: 10,
            course_name: "Fire Safety".into(),
            category: "Core".into(),
            training_record_id: record,
            expiry_date: Some(d(2026, 11, 1)),
            days_until_expiry: Some(14),
            status,
            notify_employee: employee,
            notify_admin: admin,
            reminder_frequency_days: 7,
        }
    }

    fn row(course_id: u64, status: TrainingStatus) -> TrainingStatusRow {
        TrainingStatusRow {
            employee_id: 1,
            employee_name: "Ada Jones".into(),
            employee_email: "ada@example.com".into(),
            role: "Cook".into(),
            department: None,
            course_id,
            course_name: format!("Course{course_id}"),
            category: "Core".into(),
            training_record_id: Some(course_id * 100),
            completion_date: None,
            expiry_date: None,
            status,
            days_until_expiry: None,
        }
    }

    #[test]
    fn only_expired_and_expiring_are_pending() {
        let courses: HashMap<u64, TrainingCourse> =
            [(1, course(1, Some(12), None)), (2, course(2, Some(12), None)), (3, course(3, None, None))]
                .into_iter()
                .collect();
        let rows = vec![
            row(1, TrainingStatus::Expired),
            row(2, TrainingStatus::Valid),
            row(3, TrainingStatus::ExpiringSoon),
        ];
        let ids: Vec<u64> = pending_from(rows, &courses).iter().map(|p| p.course_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&3));
    }

    #[test]
    fn recipients_follow_course_flags() {
        let admins = vec!["boss@example.com".to_string(), "hr@example.com".to_string()];

        let both = plan_emails(&[pending(Some(5), TrainingStatus::ExpiringSoon, true, true)], &admins);
        assert_eq!(both.len(), 3);
        assert_eq!(both[0].recipient_type, RecipientType::Employee);
        assert!(both[1..].iter().all(|e| e.recipient_type == RecipientType::Admin));
        assert!(both.iter().all(|e| e.notification_type == NotificationType::ExpiryWarning));

        let admin_only = plan_emails(&[pending(Some(5), TrainingStatus::Expired, false, true)], &admins);
        assert_eq!(admin_only.len(), 2);
        assert_eq!(admin_only[0].notification_type, NotificationType::Expired);
    }

    #[test]
    fn employee_who_is_also_admin_is_emailed_once() {
        let admins = vec!["ADA@example.com".to_string(), "hr@example.com".to_string()];
        let planned = plan_emails(&[pending(Some(5), TrainingStatus::ExpiringSoon, true, true)], &admins);
        let now = Utc::now();
        let due: Vec<&PlannedEmail> = planned
            .iter()
            .filter(|e| !recently_sent(&HashMap::new(), e, now))
            .collect();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].recipient_email, "ada@example.com");
        assert_eq!(due[0].recipient_type, RecipientType::Employee);
        assert_eq!(due[1].recipient_email, "hr@example.com");
    }

    #[test]
    fn a_send_in_this_run_blocks_a_repeat() {
        let email = plan_emails(&[pending(Some(5), TrainingStatus::Expired, true, false)], &[])
            .remove(0);
        let now = Utc::now();
        let mut log = HashMap::new();
        assert!(!recently_sent(&log, &email, now));
        log.insert(email.key(), now);
        assert!(recently_sent(&log, &email, now));
    }

    #[test]
    fn items_without_a_record_are_skipped() {
        let planned = plan_emails(&[pending(None, TrainingStatus::Expired, true, true)], &[]);
        assert!(planned.is_empty());
    }

    #[test]
    fn dedupe_respects_reminder_window() {
        let email = plan_emails(&[pending(Some(5), TrainingStatus::Expired, true, false)], &[])
            .remove(0);
        let now = Utc::now();
        let key = (5, "ada@example.com".to_string(), NotificationType::Expired);

        let mut log = HashMap::new();
        assert!(!recently_sent(&log, &email, now));

        log.insert(key.clone(), now - Duration::days(3));
        assert!(recently_sent(&log, &email, now));

        log.insert(key, now - Duration::days(8));
        assert!(!recently_sent(&log, &email, now));
    }

    #[test]
    fn message_wording() {
        let expired = pending(Some(5), TrainingStatus::Expired, true, false);
        assert_eq!(subject_for(&expired), "EXPIRED: Ada Jones - Fire Safety");
        assert!(body_for(&expired).contains("expired on 01/11/2026"));

        let soon = pending(Some(5), TrainingStatus::ExpiringSoon, true, false);
        assert_eq!(subject_for(&soon), "Expiring Soon: Ada Jones - Fire Safety");
        assert!(body_for(&soon).contains("expires in 14 days"));
    }
}
