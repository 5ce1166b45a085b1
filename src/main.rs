mod auth;
mod cli;
mod config;
mod console;
mod dispatch;
mod http;
mod input;
mod models;
mod spotify;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(console::log_writer)
        .init();

    let cli = Cli::parse();
    let app = App::new(cli.settings.into_config()?);

    match cli.command {
        None => {
            app.run().await?;
        }
        Some(Commands::Login) => {
            app.login().await?;
        }
        Some(Commands::Logout) => {
            app.logout()?;
        }
        Some(Commands::Status) => {
            app.status().await?;
        }
        Some(Commands::Shortcuts) => {
            app.shortcuts()?;
        }
    }

    Ok(())
}
