pub mod tax;

pub use tax::{HomeState, TaxBreakdown};
