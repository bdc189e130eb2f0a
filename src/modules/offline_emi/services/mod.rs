pub mod offline_emi_service;

pub use offline_emi_service::OfflineEmiService;
