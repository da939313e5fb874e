pub mod attendance;
pub mod audit;
pub mod department;
pub mod payroll;
pub mod request;
pub mod role;
pub mod setting;
pub mod task;
pub mod user;
