//! Date rules for training expiry, supervision months and appraisal
//! schedules. Everything here is pure; handlers pass in `today`.

pub mod appraisal;
pub mod period;
pub mod supervision;
pub mod training;

pub use period::Period;
