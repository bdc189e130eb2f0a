pub mod emi_plan;

pub use emi_plan::{EmiPlan, PlanSelection};
