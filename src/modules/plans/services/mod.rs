pub mod plan_resolver;

pub use plan_resolver::PlanResolver;
