// End-to-end installment payment flow over the in-memory stack
//
// pay -> gateway checkout -> callback/webhook -> ledger write, with the
// gateway's settlement state scripted per test.

#[path = "../helpers/mod.rs"]
mod helpers;

use emi_ledger::core::{AppError, Paise};
use emi_ledger::modules::gateways::services::webhook::expected_authorization;
use emi_ledger::modules::gateways::ChargeState;
use emi_ledger::modules::plans::EmiPlan;
use emi_ledger::modules::reconciliation::{
    AttemptRepository, AttemptStatus, CallbackOutcome, CallbackParams, PaymentInitiation,
};
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::json;

const USER: &str = "user-7";
const COURSE: &str = "course-1";
const PLAN_TXN: &str = "TXN-OPEN-7";

async fn start(stack: &TestStack) -> PaymentInitiation {
    stack
        .reconciliation
        .start_installment_payment(USER, COURSE, PLAN_TXN)
        .await
        .unwrap()
}

/// Callback parameters exactly as the gateway would send the user back
async fn callback_params(stack: &TestStack, order_id: &str) -> CallbackParams {
    let attempt = stack.attempts.find(order_id).await.unwrap().unwrap();
    CallbackParams {
        order_id: attempt.merchant_order_id,
        course_id: attempt.course_id,
        original_txn: attempt.plan_transaction_id,
        session_token: attempt.session_token,
    }
}

async fn months_left(stack: &TestStack) -> u32 {
    stack
        .ledger
        .find_active_plan(USER, COURSE, PLAN_TXN)
        .await
        .map(|plan| plan.months_left)
        .unwrap_or(0)
}

fn webhook_body(order_id: &str, state: &str) -> String {
    json!({
        "event": "checkout.order.completed",
        "payload": {
            "orderId": format!("OMO-{}", order_id),
            "merchantId": "MERCHANT",
            "merchantOrderId": order_id,
            "state": state,
            "amount": 400000,
            "paymentDetails": []
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_callback_records_installment_once() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    assert!(initiation.redirect_url.starts_with("https://checkout.example/"));
    let params = callback_params(&stack, &initiation.order_id).await;

    let first = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(first, CallbackOutcome::Recorded { months_left: 2 });

    // browser refresh, back button, duplicate redirect
    for _ in 0..3 {
        let again = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
        assert_eq!(again, CallbackOutcome::AlreadyProcessed);
    }

    assert_eq!(months_left(&stack).await, 2);
    let attempt = stack.attempts.find(&initiation.order_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Confirmed);
}

#[tokio::test]
async fn test_callback_and_webhook_race_records_once() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;
    let auth = expected_authorization(WEBHOOK_USERNAME, WEBHOOK_PASSWORD);
    let body = webhook_body(&initiation.order_id, "COMPLETED");

    let (callback, webhook) = tokio::join!(
        stack.reconciliation.handle_gateway_callback(&params),
        stack.reconciliation.handle_gateway_webhook(Some(&auth), &body),
    );

    let outcomes = [callback.unwrap(), webhook.unwrap()];
    assert!(outcomes.iter().all(CallbackOutcome::is_success));
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, CallbackOutcome::Recorded { .. }))
            .count(),
        1
    );
    assert_eq!(months_left(&stack).await, 2);
}

#[tokio::test]
async fn test_tampered_callback_changes_nothing() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    let genuine = callback_params(&stack, &initiation.order_id).await;

    let tampered = [
        CallbackParams { course_id: "course-2".into(), ..genuine.clone() },
        CallbackParams { original_txn: "TXN-OTHER".into(), ..genuine.clone() },
        CallbackParams { session_token: "0".repeat(32), ..genuine.clone() },
        CallbackParams { order_id: "EMIunknown".into(), ..genuine.clone() },
    ];

    for params in &tampered {
        let outcome = stack.reconciliation.handle_gateway_callback(params).await.unwrap();
        assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
    }

    assert_eq!(months_left(&stack).await, 3);

    // the genuine callback still goes through afterwards
    let outcome = stack.reconciliation.handle_gateway_callback(&genuine).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Recorded { months_left: 2 });
}

#[tokio::test]
async fn test_failed_payment_leaves_plan_untouched() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack.gateway.set_state(ChargeState::Failed);

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;

    let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
    assert_eq!(months_left(&stack).await, 3);

    let attempt = stack.attempts.find(&initiation.order_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Failed);

    // a new attempt is created for the retry
    let retry = start(&stack).await;
    assert_ne!(retry.order_id, initiation.order_id);
}

#[tokio::test]
async fn test_pending_then_completed() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack.gateway.set_state(ChargeState::Pending);

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;

    let pending = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(pending, CallbackOutcome::Pending);
    assert_eq!(months_left(&stack).await, 3);

    stack.gateway.set_state(ChargeState::Completed);
    let done = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(done, CallbackOutcome::Recorded { months_left: 2 });
}

#[tokio::test]
async fn test_gateway_outage_is_reported_as_pending() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;

    stack.gateway.set_unavailable(true);
    let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Pending);
    assert_eq!(months_left(&stack).await, 3);
}

#[tokio::test]
async fn test_settled_amount_mismatch_is_not_recorded() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack.gateway.settle_amount(Paise::new(100));

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;

    let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
    assert_eq!(months_left(&stack).await, 3);
}

#[tokio::test]
async fn test_open_checkout_is_reused() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let first = start(&stack).await;
    let second = start(&stack).await;

    assert_eq!(first, second);
    assert_eq!(stack.gateway.charge_count(), 1);
    assert_eq!(stack.attempts.count().await, 1);
}

#[tokio::test]
async fn test_rejected_charge_marks_attempt_failed() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack.gateway.reject_charges();

    let err = stack
        .reconciliation
        .start_installment_payment(USER, COURSE, PLAN_TXN)
        .await
        .unwrap_err();
    assert!(err.is_gateway_error());
    assert_eq!(stack.attempts.count().await, 1);
}

#[tokio::test]
async fn test_paying_without_a_plan() {
    let stack = TestStack::new();

    let err = stack
        .reconciliation
        .start_installment_payment(USER, COURSE, PLAN_TXN)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PlanNotFound(_)));
    assert_eq!(stack.gateway.charge_count(), 0);
}

#[tokio::test]
async fn test_each_installment_gets_its_own_checkout() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    for expected_left in [2, 1, 0] {
        let initiation = start(&stack).await;
        let params = callback_params(&stack, &initiation.order_id).await;
        let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Recorded { months_left: expected_left });
    }

    assert_eq!(stack.gateway.charge_count(), 3);

    // nothing left to pay
    assert!(stack
        .reconciliation
        .start_installment_payment(USER, COURSE, PLAN_TXN)
        .await
        .is_err());
}

#[tokio::test]
async fn test_webhook_requires_authorization() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    let body = webhook_body(&initiation.order_id, "COMPLETED");
    let wrong = expected_authorization(WEBHOOK_USERNAME, "guess");

    for auth in [None, Some(wrong.as_str())] {
        let err = stack
            .reconciliation
            .handle_gateway_webhook(auth, &body)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
    assert_eq!(months_left(&stack).await, 3);

    let auth = format!("SHA256 {}", expected_authorization(WEBHOOK_USERNAME, WEBHOOK_PASSWORD));
    let outcome = stack
        .reconciliation
        .handle_gateway_webhook(Some(&auth), &body)
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Recorded { months_left: 2 });
}

#[tokio::test]
async fn test_webhook_trusts_gateway_status_over_payload() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    stack.gateway.set_state(ChargeState::Failed);

    let initiation = start(&stack).await;
    let auth = expected_authorization(WEBHOOK_USERNAME, WEBHOOK_PASSWORD);

    // payload claims success, the gateway says otherwise
    let body = webhook_body(&initiation.order_id, "COMPLETED");
    let outcome = stack
        .reconciliation
        .handle_gateway_webhook(Some(&auth), &body)
        .await
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
    assert_eq!(months_left(&stack).await, 3);
}

#[tokio::test]
async fn test_expired_attempt_still_reconciles() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let initiation = start(&stack).await;
    let params = callback_params(&stack, &initiation.order_id).await;

    stack
        .attempts
        .transition(&initiation.order_id, &[AttemptStatus::Initiated], AttemptStatus::Expired)
        .await
        .unwrap();

    let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Recorded { months_left: 2 });
}

#[tokio::test]
async fn test_late_settlement_of_replaced_attempt_is_surplus() {
    let stack = TestStack::new();
    let plan = EmiPlan::new(vec![dec!(5000), dec!(2500), dec!(2500)], dec!(0)).unwrap();
    stack
        .ledger
        .open_plan(USER, &emi_course(), &plan, PLAN_TXN, None)
        .await
        .unwrap();

    // first checkout is abandoned and expires, a second one pays installment 1
    let abandoned = start(&stack).await;
    let abandoned_params = callback_params(&stack, &abandoned.order_id).await;
    stack
        .attempts
        .transition(&abandoned.order_id, &[AttemptStatus::Initiated], AttemptStatus::Expired)
        .await
        .unwrap();

    let retry = start(&stack).await;
    assert_ne!(retry.order_id, abandoned.order_id);
    let params = callback_params(&stack, &retry.order_id).await;
    let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Recorded { months_left: 2 });

    // the gateway later settles the abandoned checkout as well
    for _ in 0..2 {
        let outcome = stack
            .reconciliation
            .handle_gateway_callback(&abandoned_params)
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Surplus);
    }
    assert_eq!(months_left(&stack).await, 2);
    let abandoned_attempt = stack.attempts.find(&abandoned.order_id).await.unwrap().unwrap();
    assert_eq!(abandoned_attempt.status, AttemptStatus::Surplus);

    // the remaining installments still complete the plan
    for expected_left in [1, 0] {
        let initiation = start(&stack).await;
        let params = callback_params(&stack, &initiation.order_id).await;
        let outcome = stack.reconciliation.handle_gateway_callback(&params).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Recorded { months_left: expected_left });
    }

    let history = stack.ledger.plan_history(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(history.total_paid, dec!(10000));
    assert_eq!(history.records.len(), 4);
}

#[tokio::test]
async fn test_settlement_after_plan_completed_is_surplus() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let stale = start(&stack).await;
    let stale_params = callback_params(&stack, &stale.order_id).await;
    stack
        .attempts
        .transition(&stale.order_id, &[AttemptStatus::Initiated], AttemptStatus::Expired)
        .await
        .unwrap();

    for n in 1..=3 {
        stack
            .ledger
            .record_installment_paid(USER, COURSE, PLAN_TXN, Paise::new(400_000), &format!("TXN-PAID-{}", n))
            .await
            .unwrap();
    }

    let outcome = stack
        .reconciliation
        .handle_gateway_callback(&stale_params)
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Surplus);

    let history = stack.ledger.plan_history(USER, COURSE, PLAN_TXN).await.unwrap();
    assert_eq!(history.total_paid, dec!(12000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_create_one_checkout() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let reconciliation = stack.reconciliation.clone();
        handles.push(tokio::spawn(async move {
            reconciliation
                .start_installment_payment(USER, COURSE, PLAN_TXN)
                .await
        }));
    }

    let mut order_ids = std::collections::HashSet::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(initiation) => {
                order_ids.insert(initiation.order_id);
            }
            Err(e) => assert!(matches!(e, AppError::Validation(_)), "unexpected {e}"),
        }
    }

    assert_eq!(stack.gateway.charge_count(), 1);
    assert_eq!(stack.attempts.count().await, 1);
    assert!(order_ids.len() <= 1);
}
