// Installment ledger behaviour against the in-memory store
//
// Covers the plan lifecycle (open, pay down, complete), idempotency on the
// gateway transaction id, overpayment rejection and concurrent payments.

#[path = "../helpers/mod.rs"]
mod helpers;

use std::sync::Arc;

use emi_ledger::core::{AppError, Paise};
use emi_ledger::modules::ledger::PlanStatus;
use helpers::*;
use rust_decimal_macros::dec;

const USER: &str = "user-1";
const COURSE: &str = "course-1";
const PLAN_TXN: &str = "TXN-OPEN-1";

fn four_thousand() -> Paise {
    Paise::new(400_000)
}

#[tokio::test]
async fn test_plan_pays_down_to_completion() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let mut previous = 3;
    for n in 1..=3 {
        let plan = stack
            .ledger
            .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), &format!("TXN-{}", n))
            .await
            .unwrap();

        assert_eq!(plan.months_left, previous - 1);
        previous = plan.months_left;

        if plan.months_left > 0 {
            assert!(plan.next_emi_due_date.is_some());
        } else {
            assert!(plan.next_emi_due_date.is_none());
            assert_eq!(plan.status(chrono::Utc::now()), PlanStatus::Completed);
        }
    }

    // a completed plan accepts nothing more
    let err = stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), "TXN-4")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PlanNotFound(_)));

    let history = stack.ledger.plan_history(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(history.records.len(), 4);
    assert_eq!(history.total_paid, dec!(12000));

    assert!(stack.ledger.list_pending_plans(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_gateway_transaction_recorded_once() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), "TXN-1")
        .await
        .unwrap();

    let err = stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), "TXN-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InstallmentAlreadyRecorded(_)));

    let plan = stack.ledger.find_active_plan(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(plan.months_left, 2);
    assert_eq!(stack.ledger_repo.all_records().await.len(), 2);
}

#[tokio::test]
async fn test_overpayment_writes_nothing() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let err = stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, Paise::new(1_200_001), "TXN-BIG")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let plan = stack.ledger.find_active_plan(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(plan.months_left, 3);
    assert_eq!(stack.ledger_repo.all_records().await.len(), 1);
}

#[tokio::test]
async fn test_one_active_plan_per_course() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let err = stack
        .ledger
        .open_plan(USER, &emi_course(), &three_month_plan(), "TXN-OPEN-2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateActivePlan(_)));

    // another user is unaffected
    stack.open_plan("user-2", "TXN-OPEN-3").await;

    // once paid off, the course can be bought on EMI again
    for n in 1..=3 {
        stack
            .ledger
            .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), &format!("TXN-{}", n))
            .await
            .unwrap();
    }
    stack
        .ledger
        .open_plan(USER, &emi_course(), &three_month_plan(), "TXN-OPEN-2", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_plan() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    for (course, txn) in [("course-9", PLAN_TXN), (COURSE, "TXN-OTHER")] {
        let err = stack
            .ledger
            .record_installment_paid(USER, course, txn, four_thousand(), "TXN-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PlanNotFound(_)));
    }
}

#[tokio::test]
async fn test_concurrent_payments_never_overdraw_the_plan() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let mut handles = Vec::new();
    for n in 0..10 {
        let ledger = Arc::clone(&stack.ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), &format!("TXN-C{}", n))
                .await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            recorded += 1;
        }
    }

    assert_eq!(recorded, 3);
    let history = stack.ledger.plan_history(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(history.total_paid, dec!(12000));
    assert!(stack.ledger.find_active_plan(USER, COURSE, PLAN_TXN).await.is_err());
}

#[tokio::test]
async fn test_admin_removal() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, four_thousand(), "TXN-1")
        .await
        .unwrap();

    assert_eq!(stack.ledger.remove_plan(USER, COURSE, PLAN_TXN).await.unwrap(), 2);
    assert!(stack.ledger_repo.all_records().await.is_empty());
}

#[tokio::test]
async fn test_partial_payment_writes_nothing() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let err = stack
        .ledger
        .record_installment_paid(USER, COURSE, PLAN_TXN, Paise::new(250_000), "TXN-PART")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let plan = stack.ledger.find_active_plan(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(plan.months_left, 3);
    assert_eq!(stack.ledger_repo.all_records().await.len(), 1);
}
