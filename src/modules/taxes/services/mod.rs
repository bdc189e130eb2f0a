pub mod tax_calculator;

pub use tax_calculator::{split_tax, validate_tax_rate, TaxCalculator};
