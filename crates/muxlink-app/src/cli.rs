use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use muxlink_types::TerminalTarget;

/// CLI arguments for muxlink
#[derive(Parser)]
#[command(name = "muxlink")]
#[command(about = "Attach to terminal multiplexer windows over websocket")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Generate shell completions
    #[arg(long, value_enum)]
    pub generate: Option<Shell>,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "MUXLINK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Terminal server base URL (e.g., http://localhost:8080)
    #[arg(long, global = true, env = "MUXLINK_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,
}

/// Which multiplexer window to talk to
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Container running the multiplexer
    #[arg(long)]
    pub container: String,

    /// Multiplexer session name
    #[arg(long)]
    pub session: String,

    /// Window index within the session
    #[arg(long, default_value_t = 0)]
    pub window: u32,
}

impl TargetArgs {
    pub fn target(&self) -> TerminalTarget {
        TerminalTarget::new(self.container.clone(), self.session.clone(), self.window)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach this terminal to a multiplexer window
    Attach {
        #[command(flatten)]
        target: TargetArgs,

        /// Start with the active pane zoomed
        #[arg(long)]
        app_mode: bool,
    },
    /// Print the zoomed content of the active pane and exit
    Capture {
        #[command(flatten)]
        target: TargetArgs,

        /// Give up if no pane content arrives in time
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Print the websocket URL for a target
    Url {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_attach() {
        let cli = Cli::parse_from([
            "muxlink", "attach", "--container", "c1", "--session", "main", "--window", "2",
            "--app-mode",
        ]);
        match cli.command {
            Some(Commands::Attach { target, app_mode }) => {
                assert_eq!(target.target(), TerminalTarget::new("c1", "main", 2));
                assert!(app_mode);
            }
            _ => panic!("expected attach"),
        }
    }

    #[test]
    fn test_global_base_url_after_subcommand() {
        let cli = Cli::parse_from([
            "muxlink", "url", "--container", "c1", "--session", "s1", "--base-url", "https://x",
        ]);
        assert_eq!(cli.base_url.as_deref(), Some("https://x"));
    }
}
