//! `db` subcommands: schema migrations and connectivity checks.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check that the database answers
    Ping,
}

/// # Errors
///
/// Returns an error if migrations fail or the database does not respond.
pub(crate) async fn run_db(pool: &sqlx::PgPool, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let applied = pagepulse_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Ping => {
            pagepulse_db::ping(pool).await?;
            println!("database reachable");
        }
    }
    Ok(())
}
