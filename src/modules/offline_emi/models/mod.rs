pub mod offline_emi;

pub use offline_emi::{CreateOfflineEmiRequest, OfflineEmi, OfflineEmiStatus, ScheduleEntry};
