pub mod attendance_rules;
pub mod audit;
pub mod auto_reject;
pub mod geocode;
pub mod layouts;
pub mod notifier;
pub mod payroll;
pub mod review;
pub mod settings;
