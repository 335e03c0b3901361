pub mod appraisal;
pub mod audit;
pub mod employee;
pub mod employee_status;
pub mod grid_view;
pub mod leave;
pub mod notification;
pub mod onboarding;
pub mod reference;
pub mod role;
pub mod rota;
pub mod settings;
pub mod supervision;
pub mod training;
pub mod user;
