//! k10ls CLI - Keep Kubernetes port forwards alive
//!
//! Reads a TOML file listing contexts and their pod, service and
//! label-selector targets, then forwards every target until interrupted.

mod commands;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use k10ls_core::ConfigStore;

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "k10ls")]
#[command(author, version, about = "Keep Kubernetes port forwards alive")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "K10LS_CONFIG", default_value = k10ls_core::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Validate the config, print the session plan and exit
    #[arg(long)]
    check: bool,

    /// Print the plan as JSON (with --check)
    #[arg(long, requires = "check")]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Seconds to wait for sessions to stop on shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let store = ConfigStore::with_path(cli.config);
    let config = store
        .load()
        .await
        .with_context(|| format!("failed to load {}", store.config_path().display()))?;

    if cli.check {
        return commands::check::run(&config, cli.json);
    }

    commands::run::run(config, Duration::from_secs(cli.shutdown_grace_secs)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["k10ls"]).unwrap();
        assert_eq!(cli.shutdown_grace_secs, 5);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(!cli.check);
    }

    #[test]
    fn test_json_requires_check() {
        assert!(Cli::try_parse_from(["k10ls", "--json"]).is_err());
        let cli = Cli::try_parse_from(["k10ls", "--check", "--json", "-c", "x.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }
}
