pub mod models;
pub mod repositories;

pub use models::{Course, EmiOption};
pub use repositories::{CourseRepository, InMemoryCourseRepository, MySqlCourseRepository};
