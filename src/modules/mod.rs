pub mod courses;
pub mod gateways;
pub mod health;
pub mod invoices;
pub mod ledger;
pub mod offline_emi;
pub mod plans;
pub mod reconciliation;
pub mod taxes;
