use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use makeme::{config::Config, FileLockStore, PrintOrchestrator};
use std::{path::PathBuf, process::ExitCode};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

mod cmd_print;
mod cmd_status;

/// Drive the exclusive print slot: fetch, bound, slice, and print 3D
/// models, and report on the job in progress.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "makeme")]
struct Cli {
    /// Config file to use. Defaults are used if it doesn't exist.
    #[arg(long, short, default_value = "makeme.toml")]
    config: PathBuf,

    /// Print debug info
    #[arg(long, short, global = true)]
    debug: bool,

    /// Print logs and results as json
    #[arg(long, short, global = true)]
    json: bool,

    /// Maximum model width (X axis), in millimeters.
    #[arg(long, env = "MAKE_ME_MAX_X", value_parser = millimeters, global = true)]
    max_x: Option<f64>,

    /// Maximum model depth (Y axis), in millimeters.
    #[arg(long, env = "MAKE_ME_MAX_Y", value_parser = millimeters, global = true)]
    max_y: Option<f64>,

    /// Maximum model height (Z axis), in millimeters.
    #[arg(long, env = "MAKE_ME_MAX_Z", value_parser = millimeters, global = true)]
    max_z: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize, and start printing one or more models.
    Print(cmd_print::PrintArgs),

    /// Show the latest print progress, as a percentage.
    Progress,

    /// Show the raw job log.
    Log,

    /// Show who holds the print slot, and how far along the print is.
    Status,

    /// Clear the print slot. A print that is still running is not stopped.
    Unlock,

    /// Show the path of the current normalized model.
    CurrentModel,
}

fn millimeters(value: &str) -> Result<f64, String> {
    match value.parse::<f64>() {
        Ok(mm) if mm.is_finite() && mm > 0.0 => Ok(mm),
        Ok(mm) => Err(format!("{} is not a positive length", mm)),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    /// Load the config file, then apply any bounds given on the command
    /// line or in the environment.
    fn load_config(&self) -> Result<Config> {
        let mut config = if self.config.exists() {
            Config::from_file(&self.config)
                .with_context(|| format!("failed to load config {}", self.config.display()))?
        } else {
            tracing::debug!(path = format!("{:?}", self.config), "config file not found, using defaults");
            Config::default()
        };

        if let Some(width) = self.max_x {
            config.bounds.width = width;
        }
        if let Some(depth) = self.max_y {
            config.bounds.depth = depth;
        }
        if let Some(height) = self.max_z {
            config.bounds.height = height;
        }

        Ok(config)
    }

    fn init_tracing(&self) {
        let level = if self.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let (json, plain) = if self.json {
            (
                Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
                None,
            )
        } else {
            (None, Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(plain)
            .with({
                #[cfg(feature = "debug")]
                {
                    // When running with `debug`, we're going to hook in the console
                    // subscriber for tokio-console.
                    console_subscriber::spawn()
                }
                #[cfg(not(feature = "debug"))]
                {
                    // Under normal cases, we need a blank Layer that doesn't
                    // do anything.
                    tracing_subscriber::layer::Identity::new()
                }
            })
            .init();
    }
}

/// Build the orchestrator for the configured print slot.
fn orchestrator(config: Config) -> PrintOrchestrator<downloader::Client, FileLockStore> {
    let lock = FileLockStore::new(&config.paths.lock);
    PrintOrchestrator::new(config, downloader::Client::new(), lock)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    cli.init_tracing();

    let config = cli.load_config()?;

    match cli.command {
        Commands::Print(ref args) => cmd_print::main(&cli, config, args).await,
        Commands::Progress => cmd_status::progress(&cli, config).await,
        Commands::Log => cmd_status::log(config).await,
        Commands::Status => cmd_status::status(&cli, config).await,
        Commands::Unlock => cmd_status::unlock(config).await,
        Commands::CurrentModel => cmd_status::current_model(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_bounds_override_config() {
        let cli = Cli::parse_from([
            "makeme",
            "--config",
            "/nonexistent/makeme.toml",
            "--max-x",
            "200",
            "status",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.bounds.width, 200.0);
        assert_eq!(config.bounds.depth, 153.0);
        assert_eq!(config.bounds.height, 155.0);
    }

    #[test]
    fn test_cli_rejects_negative_bounds() {
        assert!(Cli::try_parse_from(["makeme", "--max-z", "-5", "status"]).is_err());
        assert!(Cli::try_parse_from(["makeme", "--max-z", "0", "status"]).is_err());
    }

    #[test]
    fn test_millimeters() {
        assert_eq!(millimeters("12.5"), Ok(12.5));
        assert!(millimeters("tall").is_err());
        assert!(millimeters("inf").is_err());
    }
}
