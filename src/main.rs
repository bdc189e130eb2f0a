use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emi_ledger::config::{database, Config};
use emi_ledger::middleware::{json_error_handler, path_error_handler, query_error_handler, RequestId};
use emi_ledger::modules::courses::MySqlCourseRepository;
use emi_ledger::modules::gateways::PhonePeClient;
use emi_ledger::modules::invoices::{InvoiceService, MySqlInvoiceRepository};
use emi_ledger::modules::ledger::{LedgerService, MySqlLedgerRepository};
use emi_ledger::modules::offline_emi::{MySqlOfflineEmiRepository, OfflineEmiService};
use emi_ledger::modules::reconciliation::{
    AttemptExpirySweeper, MySqlAttemptRepository, RedirectPages, ReconciliationService,
    ReconciliationSettings,
};
use emi_ledger::modules::taxes::TaxCalculator;
use emi_ledger::{configure_app, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("emi_ledger={},actix_web=info", config.app.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.app.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting EMI ledger service");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    // Create database connection pool
    let db_pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.max_connections
    );

    if config.database.run_migrations {
        database::run_migrations(&db_pool).await?;
        tracing::info!("Database migrations applied");
    }

    if !config.phonepe.webhook_enabled() {
        tracing::warn!("PhonePe webhook credentials not set; webhooks will be rejected");
    }

    // Wire repositories and services
    let attempts = Arc::new(MySqlAttemptRepository::new(db_pool.clone()));
    let ledger = Arc::new(LedgerService::new(Arc::new(MySqlLedgerRepository::new(
        db_pool.clone(),
    ))));
    let gateway = Arc::new(
        PhonePeClient::new(config.phonepe.clone()).context("Failed to build PhonePe client")?,
    );

    let reconciliation = Arc::new(ReconciliationService::new(
        ledger.clone(),
        attempts.clone(),
        gateway,
        ReconciliationSettings {
            public_base_url: config.app.public_base_url.clone(),
            attempt_ttl: chrono::Duration::minutes(i64::from(config.emi.attempt_ttl_minutes)),
            gateway_timeout: Duration::from_secs(config.phonepe.timeout_secs),
            webhook_username: config.phonepe.webhook_username.clone(),
            webhook_password: config.phonepe.webhook_password.clone(),
        },
    ));

    let tax = TaxCalculator::new(config.tax.gst_rate, config.tax.home_state())
        .context("Invalid tax configuration")?;

    let state = AppState {
        courses: Arc::new(MySqlCourseRepository::new(db_pool.clone())),
        ledger,
        reconciliation,
        invoices: Arc::new(InvoiceService::new(
            Arc::new(MySqlInvoiceRepository::new(db_pool.clone())),
            tax,
        )),
        offline_emis: Arc::new(OfflineEmiService::new(Arc::new(
            MySqlOfflineEmiRepository::new(db_pool.clone()),
        ))),
        redirect_pages: RedirectPages {
            success_url: config.app.payment_success_url.clone(),
            failure_url: config.app.payment_failure_url.clone(),
        },
    };

    // Start payment attempt expiry sweep
    let sweeper = Arc::new(AttemptExpirySweeper::new(
        attempts,
        Duration::from_secs(config.emi.expiry_sweep_interval_secs),
    ));
    tokio::spawn(sweeper.start());

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let workers = config.server.workers;
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .configure(|cfg| configure_app(cfg, &state))
    })
    .workers(workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await?;
    Ok(())
}
