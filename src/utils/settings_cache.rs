use anyhow::Result;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::info;

use crate::model::settings::CompanySettings;

const SETTINGS_KEY: u8 = 1;

static SETTINGS_CACHE: Lazy<Cache<u8, CompanySettings>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(1)
        .time_to_live(Duration::from_secs(300))
        .build()
});

pub const SETTINGS_SELECT: &str = r#"
    SELECT company_name, default_expiry_warning_days, default_notification_days_before,
           default_reminder_frequency_days, default_notify_employee, default_notify_admin,
           supervision_months_back, supervision_months_forward,
           appraisal_reviews_back, appraisal_reviews_forward, updated_at
    FROM company_settings
    WHERE id = 1
"#;

/// Company settings, served from cache when warm.
pub async fn get(pool: &MySqlPool) -> Result<CompanySettings, sqlx::Error> {
    if let Some(settings) = SETTINGS_CACHE.get(&SETTINGS_KEY).await {
        return Ok(settings);
    }

    let settings = sqlx::query_as::<_, CompanySettings>(SETTINGS_SELECT)
        .fetch_one(pool)
        .await?;
    SETTINGS_CACHE.insert(SETTINGS_KEY, settings.clone()).await;
    Ok(settings)
}

pub async fn invalidate() {
    SETTINGS_CACHE.invalidate(&SETTINGS_KEY).await;
}

pub async fn warmup(pool: &MySqlPool) -> Result<()> {
    let settings = get(pool).await?;
    info!(company = %settings.company_name, "Settings cache warmed");
    Ok(())
}
