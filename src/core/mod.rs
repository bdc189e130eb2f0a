pub mod currency;
pub mod error;
pub mod timezone;

pub use currency::Paise;
pub use error::{AppError, Result};
