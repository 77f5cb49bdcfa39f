use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{WalletProfile, WalletSummary};
use crate::db::queries;
use crate::domain::Currency;
use crate::error::AppError;
use crate::ports::RepositoryError;

#[derive(Clone)]
pub struct WalletService {
    pool: PgPool,
}

impl WalletService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a zero-balance wallet. One wallet per user and currency.
    pub async fn create(&self, user_id: Uuid, currency: Currency) -> Result<WalletSummary, AppError> {
        if queries::find_user_wallet_by_currency(&self.pool, user_id, currency)
            .await?
            .is_some()
        {
            return Err(already_exists(currency));
        }

        // The unique constraint still decides when two creations race.
        let wallet = match queries::insert_wallet(&self.pool, user_id, currency).await {
            Ok(wallet) => wallet,
            Err(RepositoryError::UniqueViolation(_)) => return Err(already_exists(currency)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(wallet_id = %wallet.id, user_id = %user_id, currency = %currency, "Wallet created");
        Ok(wallet)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WalletSummary>, AppError> {
        Ok(queries::list_user_wallets(&self.pool, user_id).await?)
    }

    pub async fn get(&self, wallet_id: Uuid) -> Result<WalletProfile, AppError> {
        queries::get_wallet_profile(&self.pool, wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet with id {} not found", wallet_id)))
    }
}

fn already_exists(currency: Currency) -> AppError {
    AppError::Conflict(format!("You already have a {} account", currency))
}
