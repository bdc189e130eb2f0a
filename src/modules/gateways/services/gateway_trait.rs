use crate::core::{Paise, Result};
use crate::modules::gateways::models::{ChargeMetadata, ChargeSession, ChargeStatus};
use async_trait::async_trait;

/// Payment gateway port used by the reconciliation service
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout for `amount`
    ///
    /// # Errors
    /// * `GatewayAuth` - credentials rejected or token unavailable
    /// * `GatewayRequest` - request rejected or response unusable
    /// * `GatewayUnreachable` - network failure or timeout
    async fn initiate_charge(
        &self,
        amount: Paise,
        merchant_order_id: &str,
        metadata: &ChargeMetadata,
        redirect_url: &str,
    ) -> Result<ChargeSession>;

    /// Look up the settlement state of a merchant order
    async fn check_status(&self, merchant_order_id: &str) -> Result<ChargeStatus>;

    /// Get gateway name
    fn name(&self) -> &str;
}
