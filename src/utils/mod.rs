pub mod audit;
pub mod db_utils;
pub mod mailer;
pub mod pagination;
pub mod settings_cache;
