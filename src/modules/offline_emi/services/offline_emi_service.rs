use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::core::{AppError, Result};
use crate::modules::offline_emi::models::{CreateOfflineEmiRequest, OfflineEmi};
use crate::modules::offline_emi::repositories::OfflineEmiRepository;

/// Cash installment plans recorded by staff
pub struct OfflineEmiService {
    repository: Arc<dyn OfflineEmiRepository>,
}

impl OfflineEmiService {
    pub fn new(repository: Arc<dyn OfflineEmiRepository>) -> Self {
        Self { repository }
    }

    /// Register a plan and its monthly schedule
    pub async fn create(&self, request: CreateOfflineEmiRequest) -> Result<OfflineEmi> {
        let emi = OfflineEmi::create(request, Utc::now())?;
        self.repository.insert(&emi).await?;

        info!(
            offline_emi_id = emi.id.as_str(),
            course_name = emi.course_name.as_str(),
            total_emis = emi.total_emis,
            monthly_emi_amount = %emi.monthly_emi_amount,
            "Registered offline EMI plan"
        );

        Ok(emi)
    }

    /// Record cash received for the schedule entry at `index` (zero-based)
    pub async fn mark_installment_paid(&self, id: &str, index: usize) -> Result<OfflineEmi> {
        let emi = self
            .repository
            .mark_installment_paid(id, index, Utc::now())
            .await?;

        info!(
            offline_emi_id = id,
            index = index,
            emis_left = emi.emis_left,
            status = %emi.status,
            "Recorded offline installment"
        );

        Ok(emi)
    }

    pub async fn get(&self, id: &str) -> Result<OfflineEmi> {
        self.repository
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Offline EMI {}", id)))
    }
}
