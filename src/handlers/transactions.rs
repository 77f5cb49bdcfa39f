use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::schemas::{
    ConfirmTransactionRequest, ConfirmedTransaction, CreateTransactionRequest,
    InitiatedTransaction, PaginationQuery,
};
use crate::validation::{validate_confirm, validate_initiate, validate_pagination};
use crate::AppState;

/// Debits the sender and emails an OTP; the transfer stays PENDING until confirmed.
#[utoipa::path(
    post,
    path = "/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transfer pending OTP confirmation", body = InitiatedTransaction),
        (status = 400, description = "Invalid request or insufficient funds"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Sender or receiver wallet not found")
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = validate_initiate(payload)?;
    let response = state.engine.initiate(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    patch,
    path = "/transactions/confirm/{id}",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    request_body = ConfirmTransactionRequest,
    responses(
        (status = 200, description = "Transfer completed", body = ConfirmedTransaction),
        (status = 401, description = "Invalid OTP or OTP has expired"),
        (status = 403, description = "Transaction is not pending"),
        (status = 404, description = "Transaction not found")
    ),
    tag = "Transactions"
)]
pub async fn confirm_transaction(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let otp = validate_confirm(payload)?;
    let response = state.engine.confirm(id, &otp).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/transactions",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Page of the caller's completed transactions"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = validate_pagination(&query)?;
    let page = state.history.user_transactions(user.id, pagination).await?;
    Ok(Json(page))
}
