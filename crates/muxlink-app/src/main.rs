use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;

use muxlink_connection::terminal_url;

mod attach;
mod capture;
mod cli;
mod config;
mod logging;
mod surface;
mod terminal;

use cli::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Some(shell) = cli.generate {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "muxlink", &mut std::io::stdout());
        return Ok(());
    }

    logging::init()?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = base_url;
    }
    config.validate()?;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Attach { target, app_mode } => {
            attach::run(&config, target.target(), app_mode).await?;
        }
        Commands::Capture {
            target,
            timeout_secs,
        } => {
            let text =
                capture::run(&config, target.target(), Duration::from_secs(timeout_secs)).await?;
            println!("{}", text);
        }
        Commands::Url { target } => {
            println!("{}", terminal_url(&config.base_url, &target.target())?);
        }
        Commands::Config => {
            if let Some(path) = &cli.config {
                eprintln!("{} {}", "Loaded".green(), path.display());
            }
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
