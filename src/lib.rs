pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod mail;
pub mod middleware;
pub mod otp;
pub mod ports;
pub mod schemas;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    extract::FromRef,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::PostgresLedgerRepository;
use crate::mail::SendGridMailer;
use crate::middleware::auth::JwtSecret;
use crate::middleware::request_logger::{request_logger_middleware, RequestLogging};
use crate::services::{HistoryService, TransactionEngine, WalletService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub engine: TransactionEngine,
    pub wallets: WalletService,
    pub history: HistoryService,
    pub jwt_secret: JwtSecret,
    pub mailer: Option<SendGridMailer>,
    pub request_logging: RequestLogging,
    pub start_time: Instant,
}

impl AppState {
    /// Wires the Postgres-backed services. `outbox_signal` wakes the dispatcher after each
    /// committed debit.
    pub fn new(
        pool: sqlx::PgPool,
        config: &config::Config,
        mailer: Option<SendGridMailer>,
        outbox_signal: Option<Arc<tokio::sync::Notify>>,
    ) -> Self {
        let ledger = Arc::new(PostgresLedgerRepository::new(pool.clone()));
        let mut engine = TransactionEngine::new(ledger, config.otp_template_id.clone());
        if let Some(signal) = outbox_signal {
            engine = engine.with_outbox_signal(signal);
        }

        Self {
            db: pool.clone(),
            engine,
            wallets: WalletService::new(pool.clone()),
            history: HistoryService::new(pool),
            jwt_secret: JwtSecret::new(config.jwt_secret.clone()),
            mailer,
            request_logging: RequestLogging {
                log_body: config.log_request_body,
            },
            start_time: Instant::now(),
        }
    }
}

impl FromRef<AppState> for JwtSecret {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_secret.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::transactions::create_transaction,
        handlers::transactions::confirm_transaction,
        handlers::transactions::list_transactions,
        handlers::wallets::create_wallet,
        handlers::wallets::list_wallets,
        handlers::wallets::get_wallet,
        handlers::wallets::outgoing_transactions,
        handlers::wallets::incoming_transactions,
        handlers::wallets::suggested_wallets,
        handlers::wallets::monthly_statement,
    ),
    components(schemas(
        schemas::CreateTransactionRequest,
        schemas::ConfirmTransactionRequest,
        schemas::CreateWalletRequest,
        schemas::InitiatedTransaction,
        schemas::ConfirmedTransaction,
        db::models::Transaction,
        db::models::WalletSummary,
        db::models::WalletProfile,
        db::models::WalletOwner,
        db::models::SuggestedWallet,
        domain::Currency,
        domain::TransactionStatus,
        domain::TransactionType,
        health::HealthResponse,
    )),
    tags(
        (name = "Transactions", description = "OTP-confirmed wallet transfers"),
        (name = "Wallets", description = "Wallets and their history"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn create_app(state: AppState) -> Router {
    let request_logging = state.request_logging;

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/transactions",
            post(handlers::transactions::create_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/confirm/:id",
            patch(handlers::transactions::confirm_transaction),
        )
        .route(
            "/wallets",
            post(handlers::wallets::create_wallet).get(handlers::wallets::list_wallets),
        )
        .route("/wallets/:id", get(handlers::wallets::get_wallet))
        .route(
            "/wallets/:id/outgoing-transactions",
            get(handlers::wallets::outgoing_transactions),
        )
        .route(
            "/wallets/:id/incoming-transactions",
            get(handlers::wallets::incoming_transactions),
        )
        .route(
            "/wallets/:id/suggested-wallets",
            get(handlers::wallets::suggested_wallets),
        )
        .route(
            "/wallets/:id/monthly-statement",
            get(handlers::wallets::monthly_statement),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            request_logging,
            request_logger_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/health",
            "/transactions",
            "/transactions/confirm/{id}",
            "/wallets",
            "/wallets/{id}",
            "/wallets/{id}/outgoing-transactions",
            "/wallets/{id}/incoming-transactions",
            "/wallets/{id}/suggested-wallets",
            "/wallets/{id}/monthly-statement",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
