use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::cli::{self, Cli, Commands, DbCommands, OutboxCommands, TxCommands};
use wallet_ledger::config::{Config, LogFormat};
use wallet_ledger::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Outbox(command) => {
            let pool = db::create_pool(&config).await?;
            match command {
                OutboxCommands::Run => cli::handle_outbox_run(&config, pool).await,
                OutboxCommands::Failed { limit } => cli::handle_outbox_failed(&pool, limit).await,
                OutboxCommands::Requeue { id } => cli::handle_outbox_requeue(&pool, id).await,
            }
        }
        Commands::Tx(TxCommands::Stale { older_than_minutes }) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_stale(&pool, older_than_minutes).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let (mailer, sendgrid) = cli::build_mailer(&config);
    let dispatcher = cli::build_dispatcher(&config, pool.clone(), mailer);
    let signal = dispatcher.signal();
    let poll_interval = Duration::from_millis(config.outbox_poll_interval_ms);

    tokio::spawn(async move {
        dispatcher.run(poll_interval).await;
    });

    let app_state = AppState::new(pool, &config, sendgrid, Some(signal));
    let app = create_app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
