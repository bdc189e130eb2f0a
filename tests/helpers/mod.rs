// Shared fixtures for integration and contract tests
//
// Everything runs against the in-memory repositories and a scripted gateway,
// so these suites need neither a database nor network access. MySQL-backed
// checks live in mysql_ledger_test and are ignored by default.
//
// Usage:
//   #[path = "../helpers/mod.rs"]
//   mod helpers;

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use emi_ledger::core::{AppError, Paise, Result};
use emi_ledger::modules::courses::{Course, EmiOption, InMemoryCourseRepository};
use emi_ledger::modules::gateways::{
    ChargeMetadata, ChargeSession, ChargeState, ChargeStatus, PaymentGateway,
};
use emi_ledger::modules::invoices::{InMemoryInvoiceRepository, InvoiceService};
use emi_ledger::modules::ledger::{InMemoryLedgerRepository, LedgerService};
use emi_ledger::modules::offline_emi::{InMemoryOfflineEmiRepository, OfflineEmiService};
use emi_ledger::modules::plans::EmiPlan;
use emi_ledger::modules::reconciliation::{
    InMemoryAttemptRepository, RedirectPages, ReconciliationService, ReconciliationSettings,
};
use emi_ledger::modules::taxes::{HomeState, TaxCalculator};
use emi_ledger::AppState;

pub const PUBLIC_BASE_URL: &str = "https://emi.example";
pub const SUCCESS_URL: &str = "https://lms.example/payment/success";
pub const FAILURE_URL: &str = "https://lms.example/payment/failure";
pub const WEBHOOK_USERNAME: &str = "hook-user";
pub const WEBHOOK_PASSWORD: &str = "hook-pass";

/// Gateway double whose settlement state is set by the test
pub struct ScriptedGateway {
    state: Mutex<ChargeState>,
    settled_amount: Mutex<Option<Paise>>,
    reject_charges: Mutex<bool>,
    unavailable: Mutex<bool>,
    charges: Mutex<HashMap<String, Paise>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChargeState::Completed),
            settled_amount: Mutex::new(None),
            reject_charges: Mutex::new(false),
            unavailable: Mutex::new(false),
            charges: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_state(&self, state: ChargeState) {
        *self.state.lock().unwrap() = state;
    }

    /// Report a different settled amount than was charged
    pub fn settle_amount(&self, amount: Paise) {
        *self.settled_amount.lock().unwrap() = Some(amount);
    }

    pub fn reject_charges(&self) {
        *self.reject_charges.lock().unwrap() = true;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_charge(
        &self,
        amount: Paise,
        merchant_order_id: &str,
        _metadata: &ChargeMetadata,
        _redirect_url: &str,
    ) -> Result<ChargeSession> {
        if *self.reject_charges.lock().unwrap() {
            return Err(AppError::GatewayRequest("Charge declined".to_string()));
        }

        self.charges
            .lock()
            .unwrap()
            .insert(merchant_order_id.to_string(), amount);

        Ok(ChargeSession {
            gateway_order_id: format!("OMO-{}", merchant_order_id),
            redirect_url: format!("https://checkout.example/pay/{}", merchant_order_id),
        })
    }

    async fn check_status(&self, merchant_order_id: &str) -> Result<ChargeStatus> {
        if *self.unavailable.lock().unwrap() {
            return Err(AppError::GatewayUnreachable("connection refused".to_string()));
        }

        let charged = self
            .charges
            .lock()
            .unwrap()
            .get(merchant_order_id)
            .copied()
            .ok_or_else(|| AppError::GatewayRequest("Unknown order".to_string()))?;

        let amount = self.settled_amount.lock().unwrap().unwrap_or(charged);

        Ok(ChargeStatus {
            state: *self.state.lock().unwrap(),
            amount,
            gateway_transaction_id: Some(format!("PG-{}", merchant_order_id)),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Course priced at 12000 with a 3 month option and a 6 month scheduled option
pub fn emi_course() -> Course {
    Course {
        id: "course-1".to_string(),
        title: "Full Stack Web Development".to_string(),
        base_price: dec!(15000),
        discounted_price: Some(dec!(12000)),
        emi_enabled: true,
        emi_minimum_amount: dec!(5000),
        emi_options: vec![
            EmiOption::Uniform {
                months: 3,
                monthly_amount: dec!(4000),
                processing_fee: dec!(199),
            },
            EmiOption::Scheduled {
                months: 6,
                monthly_amounts: vec![
                    dec!(3000),
                    dec!(2000),
                    dec!(2000),
                    dec!(2000),
                    dec!(2000),
                    dec!(1000),
                ],
                processing_fee: dec!(0),
            },
        ],
    }
}

pub fn three_month_plan() -> EmiPlan {
    EmiPlan::new(vec![dec!(4000), dec!(4000), dec!(4000)], Decimal::ZERO)
        .expect("valid plan")
}

pub fn tax_calculator() -> TaxCalculator {
    TaxCalculator::new(dec!(0.18), HomeState::parse("UP,Uttar Pradesh")).expect("valid rate")
}

/// In-memory wiring of the whole payment flow
pub struct TestStack {
    pub ledger_repo: Arc<InMemoryLedgerRepository>,
    pub attempts: Arc<InMemoryAttemptRepository>,
    pub gateway: Arc<ScriptedGateway>,
    pub ledger: Arc<LedgerService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl TestStack {
    pub fn new() -> Self {
        let ledger_repo = Arc::new(InMemoryLedgerRepository::new());
        let attempts = Arc::new(InMemoryAttemptRepository::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let ledger = Arc::new(LedgerService::new(ledger_repo.clone()));

        let reconciliation = Arc::new(ReconciliationService::new(
            ledger.clone(),
            attempts.clone(),
            gateway.clone(),
            ReconciliationSettings {
                public_base_url: PUBLIC_BASE_URL.to_string(),
                attempt_ttl: chrono::Duration::minutes(20),
                gateway_timeout: Duration::from_secs(2),
                webhook_username: WEBHOOK_USERNAME.to_string(),
                webhook_password: WEBHOOK_PASSWORD.to_string(),
            },
        ));

        Self {
            ledger_repo,
            attempts,
            gateway,
            ledger,
            reconciliation,
        }
    }

    /// Open the standard three month plan for `user_id` under `txn`
    pub async fn open_plan(&self, user_id: &str, txn: &str) {
        self.ledger
            .open_plan(user_id, &emi_course(), &three_month_plan(), txn, None)
            .await
            .expect("plan opens");
    }

    /// Application state over this stack, for HTTP tests
    pub fn app_state(&self) -> AppState {
        AppState {
            courses: Arc::new(InMemoryCourseRepository::with_courses([emi_course()])),
            ledger: self.ledger.clone(),
            reconciliation: self.reconciliation.clone(),
            invoices: Arc::new(InvoiceService::new(
                Arc::new(InMemoryInvoiceRepository::new()),
                tax_calculator(),
            )),
            offline_emis: Arc::new(OfflineEmiService::new(Arc::new(
                InMemoryOfflineEmiRepository::new(),
            ))),
            redirect_pages: RedirectPages {
                success_url: SUCCESS_URL.to_string(),
                failure_url: FAILURE_URL.to_string(),
            },
        }
    }
}

/// Query parameters of a URL as a map
pub fn query_of(url: &str) -> HashMap<String, String> {
    reqwest::Url::parse(url)
        .expect("valid url")
        .query_pairs()
        .into_owned()
        .collect()
}
