pub mod offline_emi_repository;

pub use offline_emi_repository::{
    InMemoryOfflineEmiRepository, MySqlOfflineEmiRepository, OfflineEmiRepository,
};
