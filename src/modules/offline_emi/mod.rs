pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{CreateOfflineEmiRequest, OfflineEmi, OfflineEmiStatus};
pub use repositories::{InMemoryOfflineEmiRepository, MySqlOfflineEmiRepository, OfflineEmiRepository};
pub use services::OfflineEmiService;
