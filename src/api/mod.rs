pub mod attendance;
pub mod audit;
pub mod dashboard;
pub mod departments;
pub mod late_request;
pub mod layouts;
pub mod leave_request;
pub mod notifications;
pub mod overtime_request;
pub mod paging;
pub mod payroll;
pub mod profile;
pub mod requests;
pub mod settings;
pub mod tasks;
pub mod users;
