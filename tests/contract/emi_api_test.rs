// Contract tests for the HTTP surface
//
// Runs the full route table from `configure_app` over in-memory
// repositories and a scripted gateway.

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use emi_ledger::configure_app;
use emi_ledger::middleware::{json_error_handler, query_error_handler, USER_ID_HEADER};
use emi_ledger::modules::gateways::services::webhook::expected_authorization;
use emi_ledger::modules::invoices::Invoice;
use emi_ledger::modules::ledger::DuePlan;
use emi_ledger::modules::offline_emi::{OfflineEmi, OfflineEmiStatus};
use emi_ledger::modules::plans::EmiPlan;
use emi_ledger::modules::reconciliation::AttemptRepository;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

const USER: &str = "user-9";
const PLAN_TXN: &str = "TXN-OPEN-9";

macro_rules! app {
    ($stack:expr) => {{
        let state = $stack.app_state();
        test::init_service(
            App::new()
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .app_data(web::QueryConfig::default().error_handler(query_error_handler))
                .configure(|cfg| configure_app(cfg, &state)),
        )
        .await
    }};
}

/// Status of a request whose middleware may reject it before a response exists
async fn status_of<S, R, B>(app: &S, req: R) -> StatusCode
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    }
}

#[actix_web::test]
async fn test_pay_requires_user_header() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::get().uri("/emi/pay").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/emi/pay")
        .set_json(json!({"courseId": "course-1", "transactionId": PLAN_TXN}))
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/emi/due").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_pending_listing_contract() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    let app = app!(stack);

    let req = test::TestRequest::get()
        .uri("/emi/pay")
        .insert_header((USER_ID_HEADER, USER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let first = &body.as_array().expect("array of plans")[0];
    for field in ["courseId", "courseName", "monthsLeft", "emiAmount", "nextDueDate", "totalEMIMonths"] {
        assert!(first.get(field).is_some(), "missing {}", field);
    }

    let plans: Vec<DuePlan> = serde_json::from_value(body).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].months_left, 3);
    assert_eq!(plans[0].emi_amount, dec!(4000));
    assert_eq!(plans[0].original_transaction_id, PLAN_TXN);

    // another user sees nothing
    let req = test::TestRequest::get()
        .uri("/emi/pay")
        .insert_header((USER_ID_HEADER, "someone-else"))
        .to_request();
    let plans: Vec<DuePlan> = test::call_and_read_body_json(&app, req).await;
    assert!(plans.is_empty());
}

#[actix_web::test]
async fn test_pay_and_callback_redirect() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    let app = app!(stack);

    let req = test::TestRequest::post()
        .uri("/emi/pay")
        .insert_header((USER_ID_HEADER, USER))
        .set_json(json!({"courseId": "course-1", "transactionId": PLAN_TXN}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let order_id = body["orderId"].as_str().unwrap().to_string();
    assert!(body["redirectUrl"].as_str().unwrap().starts_with("https://checkout.example/pay/"));

    let attempt = stack.attempts.find(&order_id).await.unwrap().unwrap();
    let callback = |token: &str| {
        format!(
            "/emi/callback?id={}&courseId=course-1&originalTxn={}&sessionToken={}",
            order_id, PLAN_TXN, token
        )
    };

    // a forged token never reaches the ledger
    let req = test::TestRequest::get().uri(&callback("forged")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(FAILURE_URL));
    assert_eq!(query_of(location)["status"], "failed");

    let req = test::TestRequest::get()
        .uri(&callback(&attempt.session_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(SUCCESS_URL));
    let query = query_of(location);
    assert_eq!(query["status"], "success");
    assert_eq!(query["courseId"], "course-1");

    let plan = stack.ledger.find_active_plan(USER, "course-1", PLAN_TXN).await.unwrap();
    assert_eq!(plan.months_left, 2);
}

#[actix_web::test]
async fn test_callback_with_missing_params_redirects_to_failure() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::get().uri("/emi/callback").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(FAILURE_URL));
}

#[actix_web::test]
async fn test_callback_with_malformed_query_redirects_to_failure() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::get()
        .uri("/emi/callback?id=%zz&courseId=course-1&sessionToken=%E0%A4")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(FAILURE_URL));
    let query = query_of(location);
    assert_eq!(query["courseId"], "course-1");
    assert_eq!(query["status"], "failed");
}

#[actix_web::test]
async fn test_webhook_contract() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    let initiation = stack
        .reconciliation
        .start_installment_payment(USER, "course-1", PLAN_TXN)
        .await
        .unwrap();
    let app = app!(stack);

    let body = json!({
        "event": "checkout.order.completed",
        "payload": {
            "orderId": format!("OMO-{}", initiation.order_id),
            "merchantId": "MERCHANT",
            "merchantOrderId": initiation.order_id,
            "state": "COMPLETED",
            "amount": 400000,
            "paymentDetails": []
        }
    })
    .to_string();

    let req = test::TestRequest::post()
        .uri("/emi/webhook")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload(body.clone())
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/emi/webhook")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .insert_header((
            header::AUTHORIZATION,
            expected_authorization(WEBHOOK_USERNAME, WEBHOOK_PASSWORD),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "recorded");
    assert_eq!(ack["months_left"], 2);
}

#[actix_web::test]
async fn test_plan_preview_contract() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::get().uri("/emi/plans/course-1?months=3").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let plan: EmiPlan = test::read_body_json(resp).await;
    assert_eq!(plan.months, 3);
    assert_eq!(plan.processing_fee, dec!(199));
    assert_eq!(
        plan.total_payable,
        plan.per_month_amounts.iter().copied().sum::<rust_decimal::Decimal>() + dec!(199)
    );

    let req = test::TestRequest::get().uri("/emi/plans/course-1?option=1").to_request();
    let plan: EmiPlan = test::call_and_read_body_json(&app, req).await;
    assert_eq!(plan.months, 6);
    assert_eq!(plan.per_month_amounts[0], dec!(3000));

    for (uri, expected) in [
        ("/emi/plans/course-1", StatusCode::BAD_REQUEST),
        ("/emi/plans/course-1?months=3&option=0", StatusCode::BAD_REQUEST),
        ("/emi/plans/course-1?months=abc", StatusCode::BAD_REQUEST),
        ("/emi/plans/unknown?months=3", StatusCode::NOT_FOUND),
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(status_of(&app, req).await, expected, "{}", uri);
    }
}

#[actix_web::test]
async fn test_invoice_contract() {
    let stack = TestStack::new();
    let app = app!(stack);

    let request = json!({
        "channel": "online",
        "transactionId": "TXN-INV-1",
        "admissionFormId": "form-1",
        "studentName": "Priya Sharma",
        "studentEmail": "priya@example.com",
        "studentState": "Maharashtra",
        "courseId": "course-1",
        "courseTitle": "Full Stack Web Development",
        "amount": 11800
    });

    let req = test::TestRequest::post().uri("/invoices").set_json(&request).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let invoice: Invoice = test::read_body_json(resp).await;
    assert!(invoice.invoice_number.starts_with("ON"));
    assert_eq!(invoice.sequence, 1);
    assert_eq!(invoice.tax.igst, dec!(1800));
    assert_eq!(invoice.tax.cgst, dec!(0));

    // same transaction and form returns the existing invoice
    let req = test::TestRequest::post().uri("/invoices").set_json(&request).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let again: Invoice = test::read_body_json(resp).await;
    assert_eq!(again.invoice_number, invoice.invoice_number);

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", invoice.invoice_number))
        .to_request();
    let fetched: Invoice = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, invoice);

    let req = test::TestRequest::get().uri("/invoices/ON-missing").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/invoices")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]["message"].is_string());
}

#[actix_web::test]
async fn test_offline_emi_contract() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::post()
        .uri("/admin/offline-emis")
        .set_json(json!({
            "studentName": "Kiran Rao",
            "studentEmail": "kiran@example.com",
            "courseName": "Data Science",
            "totalAmount": 9000,
            "totalEmis": 3,
            "startDate": "2025-01-15"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let emi: OfflineEmi = test::read_body_json(resp).await;
    assert_eq!(emi.monthly_emi_amount, dec!(3000));
    assert_eq!(emi.emi_schedule.len(), 3);

    let pay = format!("/admin/offline-emis/{}/schedule/0/pay", emi.id);
    let req = test::TestRequest::post().uri(&pay).to_request();
    let updated: OfflineEmi = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated.emis_paid_months, 1);
    assert_eq!(updated.total_emi_due, dec!(6000));

    let req = test::TestRequest::post().uri(&pay).to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/admin/offline-emis/{}/schedule/7/pay", emi.id))
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/admin/offline-emis/{}", emi.id))
        .to_request();
    let fetched: OfflineEmi = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched.status, OfflineEmiStatus::Active);
    assert!(fetched.emi_schedule[0].paid);

    let req = test::TestRequest::get().uri("/admin/offline-emis/nope").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_admin_plan_removal() {
    let stack = TestStack::new();
    stack.open_plan(USER, PLAN_TXN).await;
    let app = app!(stack);

    let uri = format!("/admin/users/{}/emi/course-1/{}", USER, PLAN_TXN);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["removed"], 1);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health_without_database() {
    let stack = TestStack::new();
    let app = app!(stack);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "not_configured");
}
