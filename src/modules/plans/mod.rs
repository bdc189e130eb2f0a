pub mod controllers;
pub mod models;
pub mod services;

pub use models::{EmiPlan, PlanSelection};
pub use services::PlanResolver;
