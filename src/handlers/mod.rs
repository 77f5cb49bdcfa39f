pub mod transactions;
pub mod wallets;

use crate::health::{check_health, HealthResponse, MailChecker, PostgresChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(
        PostgresChecker::new(state.db.clone()),
        MailChecker::new(state.mailer.clone()),
        state.start_time,
    )
    .await;

    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}
