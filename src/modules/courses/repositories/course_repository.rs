// Course catalog persistence
//
// Courses are edited by staff elsewhere; this service only needs to read a
// course and its EMI options. `save` exists for seeding and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::{AppError, Result};
use crate::modules::courses::models::{encode_emi_options, parse_emi_options, Course};

/// Read access to the course catalog
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Course>>;

    async fn save(&self, course: &Course) -> Result<()>;
}

/// MySQL-backed course repository
pub struct MySqlCourseRepository {
    pool: MySqlPool,
}

impl MySqlCourseRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseRepository for MySqlCourseRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT
                id, title, base_price, discounted_price, emi_enabled,
                emi_minimum_amount, emi_options
            FROM courses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch course: {}", e)))?;

        row.map(Course::try_from).transpose()
    }

    async fn save(&self, course: &Course) -> Result<()> {
        let options = encode_emi_options(&course.emi_options)?;

        sqlx::query(
            r#"
            INSERT INTO courses (
                id, title, base_price, discounted_price, emi_enabled,
                emi_minimum_amount, emi_options
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                title = VALUES(title),
                base_price = VALUES(base_price),
                discounted_price = VALUES(discounted_price),
                emi_enabled = VALUES(emi_enabled),
                emi_minimum_amount = VALUES(emi_minimum_amount),
                emi_options = VALUES(emi_options)
            "#,
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(course.base_price)
        .bind(course.discounted_price)
        .bind(course.emi_enabled)
        .bind(course.emi_minimum_amount)
        .bind(options)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to save course: {}", e)))?;

        Ok(())
    }
}

/// Database row representation for the courses table
#[derive(sqlx::FromRow)]
struct CourseRow {
    id: String,
    title: String,
    base_price: Decimal,
    discounted_price: Option<Decimal>,
    emi_enabled: bool,
    emi_minimum_amount: Decimal,
    emi_options: Option<String>,
}

impl TryFrom<CourseRow> for Course {
    type Error = AppError;

    fn try_from(row: CourseRow) -> Result<Self> {
        let emi_options = match row.emi_options.as_deref() {
            Some(json) if !json.trim().is_empty() => parse_emi_options(json).map_err(|e| {
                AppError::validation(format!("Course {} has malformed EMI options: {}", row.id, e))
            })?,
            _ => Vec::new(),
        };

        Ok(Course {
            id: row.id,
            title: row.title,
            base_price: row.base_price,
            discounted_price: row.discounted_price,
            emi_enabled: row.emi_enabled,
            emi_minimum_amount: row.emi_minimum_amount,
            emi_options,
        })
    }
}

/// In-process course repository for local runs and tests
#[derive(Default)]
pub struct InMemoryCourseRepository {
    courses: RwLock<HashMap<String, Course>>,
}

impl InMemoryCourseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_courses(courses: impl IntoIterator<Item = Course>) -> Self {
        Self {
            courses: RwLock::new(courses.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }
}

#[async_trait]
impl CourseRepository for InMemoryCourseRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Course>> {
        Ok(self.courses.read().await.get(id).cloned())
    }

    async fn save(&self, course: &Course) -> Result<()> {
        self.courses
            .write()
            .await
            .insert(course.id.clone(), course.clone());
        Ok(())
    }
}
