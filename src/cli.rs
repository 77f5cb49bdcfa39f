use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::PostgresLedgerRepository;
use crate::config::Config;
use crate::db::queries::{self, RequeueOutcome};
use crate::mail::{LogMailer, Mailer, SendGridMailer};
use crate::services::{NotificationDispatcher, RetryPolicy};

#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "Wallet Ledger - OTP-confirmed transfers between custodial wallets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and notification dispatcher (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Notification outbox commands
    #[command(subcommand)]
    Outbox(OutboxCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// List PENDING transfers whose OTP expired. Read-only; debits stay in place.
    Stale {
        /// Only report transfers whose OTP expired at least this many minutes ago
        #[arg(long, default_value_t = 0)]
        older_than_minutes: i64,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// Run the dispatcher without the HTTP server
    Run,

    /// List notifications that exhausted their attempts
    Failed {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Give a FAILED notification a fresh attempt budget. Scrubbed payloads are refused.
    Requeue {
        /// Outbox message UUID
        #[arg(value_name = "ID")]
        id: Uuid,
    },
}

/// Picks SendGrid when an API key is configured, the logging mailer otherwise.
pub fn build_mailer(config: &Config) -> (Arc<dyn Mailer>, Option<SendGridMailer>) {
    match &config.sendgrid_api_key {
        Some(key) => {
            let mailer = SendGridMailer::new(
                config.sendgrid_base_url.clone(),
                key.clone(),
                config.sender_email.clone(),
            );
            (Arc::new(mailer.clone()), Some(mailer))
        }
        None => {
            tracing::warn!("SENDGRID_API_KEY not set, OTP emails will only be logged");
            (Arc::new(LogMailer), None)
        }
    }
}

pub fn build_dispatcher(config: &Config, pool: PgPool, mailer: Arc<dyn Mailer>) -> NotificationDispatcher {
    let policy = RetryPolicy {
        batch_size: config.outbox_batch_size,
        ..RetryPolicy::default()
    };
    NotificationDispatcher::new(Arc::new(PostgresLedgerRepository::new(pool)), mailer, policy)
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_outbox_run(config: &Config, pool: PgPool) -> anyhow::Result<()> {
    let (mailer, _) = build_mailer(config);
    let dispatcher = build_dispatcher(config, pool, mailer);
    dispatcher
        .run(Duration::from_millis(config.outbox_poll_interval_ms))
        .await;
    Ok(())
}

pub async fn handle_outbox_failed(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let failed = queries::list_failed_notifications(pool, limit).await?;

    if failed.is_empty() {
        println!("✓ No failed notifications");
        return Ok(());
    }

    for message in failed {
        println!(
            "{}  to={}  template={}  attempts={}  error={}",
            message.id,
            message.recipient,
            message.template_id,
            message.attempts,
            message.last_error.unwrap_or_default()
        );
    }

    Ok(())
}

pub async fn handle_outbox_requeue(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    match queries::requeue_notification(pool, id).await? {
        RequeueOutcome::Requeued => {
            tracing::info!("Outbox message {} requeued", id);
            println!("✓ Outbox message {} requeued", id);
            Ok(())
        }
        RequeueOutcome::PayloadScrubbed => {
            tracing::warn!("Outbox message {} has a scrubbed payload", id);
            anyhow::bail!(
                "Outbox message {} payload scrubbed, initiate a new transfer instead",
                id
            )
        }
        RequeueOutcome::NotFailed => {
            tracing::warn!("No FAILED outbox message {}", id);
            anyhow::bail!("No FAILED outbox message with id {}", id)
        }
    }
}

pub async fn handle_tx_stale(pool: &PgPool, older_than_minutes: i64) -> anyhow::Result<()> {
    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(older_than_minutes.max(0));
    let stale = queries::stale_pending_transactions(pool, cutoff).await?;

    if stale.is_empty() {
        println!("✓ No stale pending transactions");
        return Ok(());
    }

    for tx in &stale {
        println!(
            "{}  {}  {} {}  sender={}  otp_expired_at={}",
            tx.id,
            tx.ref_number,
            tx.amount,
            tx.currency,
            tx.sender_wallet_id,
            tx.otp_expires_at.to_rfc3339()
        );
    }
    println!("{} stale pending transaction(s)", stale.len());

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    config.validate()?;
    let redacted = config.redacted();

    println!("Configuration:");
    println!("  Server Port: {}", redacted.server_port);
    println!("  Database URL: {}", redacted.database_url);
    println!("  Database Max Connections: {}", redacted.database_max_connections);
    println!(
        "  Mail Provider: {}",
        if redacted.sendgrid_api_key.is_some() {
            redacted.sendgrid_base_url.as_str()
        } else {
            "log only"
        }
    );
    println!("  Sender Email: {}", redacted.sender_email);
    println!("  OTP Template: {}", redacted.otp_template_id);
    println!("  Log Format: {:?}", redacted.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_outbox_requeue() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["wallet-ledger", "outbox", "requeue", &id.to_string()]).unwrap();
        match cli.command {
            Some(Commands::Outbox(OutboxCommands::Requeue { id: parsed })) => assert_eq!(parsed, id),
            _ => panic!("expected outbox requeue"),
        }
    }

    #[test]
    fn parses_tx_stale_threshold() {
        let cli = Cli::try_parse_from(["wallet-ledger", "tx", "stale", "--older-than-minutes", "30"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Tx(TxCommands::Stale { older_than_minutes: 30 }))
        ));
    }

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["wallet-ledger"]).unwrap();
        assert!(cli.command.is_none());
    }
}
