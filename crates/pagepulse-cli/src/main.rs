mod db;
mod run;
mod schedule;
mod status;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;

#[derive(Debug, Parser)]
#[command(name = "pagepulse-cli")]
#[command(about = "Realtime page-metrics pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline once; exits non-zero if the run fails
    Run {
        /// End of the run window (RFC 3339); defaults to the current time
        #[arg(long, value_parser = run::parse_rfc3339)]
        now: Option<DateTime<Utc>>,
    },
    /// Run the pipeline on the configured cron schedule until interrupted
    Schedule,
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Show recent run windows and table statistics
    Status {
        /// Maximum number of run windows to show
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
    /// Verify analytics API credentials with a one-row report
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("pagepulse-cli: no command given, see --help");
        return Ok(());
    };

    let config = if matches!(command, Commands::Check) {
        pagepulse_core::load_app_config_without_database()?
    } else {
        pagepulse_core::load_app_config()?
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Run { now } => {
            let pool = connect(&config).await?;
            pagepulse_db::run_migrations(&pool).await?;
            run::run_once(&pool, &config, now.unwrap_or_else(Utc::now)).await
        }
        Commands::Schedule => {
            let pool = connect(&config).await?;
            pagepulse_db::run_migrations(&pool).await?;
            schedule::run_schedule(pool, &config).await
        }
        Commands::Db { command } => db::run_db(&connect(&config).await?, command).await,
        Commands::Status { limit } => status::run_status(&connect(&config).await?, limit).await,
        Commands::Check => run::run_check(&config).await,
    }
}

async fn connect(config: &pagepulse_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = pagepulse_db::PoolConfig::from_app_config(config);
    let pool = pagepulse_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}
