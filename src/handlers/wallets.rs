use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::db::models::{SuggestedWallet, WalletProfile, WalletSummary};
use crate::db::queries::Direction;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::schemas::{ApiResponse, CreateWalletRequest, PaginationQuery};
use crate::services::history::statement_filename;
use crate::validation::validate_pagination;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/wallets",
    request_body = CreateWalletRequest,
    responses(
        (status = 201, description = "Wallet created", body = WalletSummary),
        (status = 409, description = "A wallet in this currency already exists")
    ),
    tag = "Wallets"
)]
pub async fn create_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallets.create(user.id, payload.currency).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("You have successfully created a wallet", wallet)),
    ))
}

#[utoipa::path(
    get,
    path = "/wallets",
    responses((status = 200, description = "The caller's wallets", body = [WalletSummary])),
    tag = "Wallets"
)]
pub async fn list_wallets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let wallets = state.wallets.list(user.id).await?;
    Ok(Json(ApiResponse::new("Wallets successfully retrieved", wallets)))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Public wallet profile", body = WalletProfile),
        (status = 404, description = "Wallet not found")
    ),
    tag = "Wallets"
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallets.get(id).await?;
    Ok(Json(ApiResponse::new("Wallet successfully retrieved", wallet)))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}/outgoing-transactions",
    params(("id" = Uuid, Path, description = "Wallet ID"), PaginationQuery),
    responses(
        (status = 200, description = "Page of completed transfers sent from the wallet"),
        (status = 404, description = "Wallet not found or does not belong to user")
    ),
    tag = "Wallets"
)]
pub async fn outgoing_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = validate_pagination(&query)?;
    let page = state
        .history
        .wallet_transactions(user.id, id, Direction::Outgoing, pagination)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}/incoming-transactions",
    params(("id" = Uuid, Path, description = "Wallet ID"), PaginationQuery),
    responses(
        (status = 200, description = "Page of completed transfers received by the wallet"),
        (status = 404, description = "Wallet not found or does not belong to user")
    ),
    tag = "Wallets"
)]
pub async fn incoming_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = validate_pagination(&query)?;
    let page = state
        .history
        .wallet_transactions(user.id, id, Direction::Incoming, pagination)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}/suggested-wallets",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Most frequent recipients over the last three months", body = [SuggestedWallet]),
        (status = 404, description = "Wallet not found or does not belong to user")
    ),
    tag = "Wallets"
)]
pub async fn suggested_wallets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let suggestions = state.history.suggested_wallets(user.id, id).await?;
    Ok(Json(ApiResponse::new("Suggested wallets successfully retrieved", suggestions)))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}/monthly-statement",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "CSV statement of the last 30 days", body = String, content_type = "text/csv"),
        (status = 404, description = "Wallet not found or does not belong to user")
    ),
    tag = "Wallets"
)]
pub async fn monthly_statement(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.history.monthly_statement(user.id, id).await?;
    let disposition = format!("attachment; filename=\"{}\"", statement_filename(id));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
