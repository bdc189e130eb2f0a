pub mod course_repository;

pub use course_repository::{CourseRepository, InMemoryCourseRepository, MySqlCourseRepository};
