pub mod models;
pub mod services;

pub use models::{HomeState, TaxBreakdown};
pub use services::{split_tax, TaxCalculator};
