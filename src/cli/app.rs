// ABOUTME: Main application orchestration for the conductor CLI
// ABOUTME: Coordinates between CLI arguments, configuration, logging and command execution

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::commands;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration. `RUST_LOG` wins over the
    /// configured level.
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false);

        let initialised = match self.config.logging.format.as_str() {
            "compact" => builder.compact().try_init(),
            "json" => builder.json().try_init(),
            _ => builder.pretty().try_init(),
        };
        initialised.map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the selected subcommand. Returns whether it succeeded.
    pub async fn run(&self, args: Args) -> Result<bool> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting conductor v{}", crate::VERSION);
        debug!("Configuration file: {:?}", args.config);

        match args.command {
            Commands::Run {
                plan,
                vars,
                dry_run,
                output,
            } => {
                let variables = Args::parse_variables(&vars)?;
                commands::run_plan(plan, variables, dry_run, output, &self.config).await
            }
            Commands::Validate { plan } => commands::validate_plan(plan).await,
            Commands::Tasks => commands::list_tasks(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_app_from_args_with_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("conductor.yaml");
        fs::write(
            &config_path,
            "logging:\n  level: debug\n  format: compact\nengine:\n  cancel_on_timeout: true\n",
        )
        .unwrap();

        let args = Args {
            command: Commands::Tasks,
            verbose: false,
            config: Some(config_path),
            no_color: true,
        };

        let app = App::from_args(&args).unwrap();
        assert_eq!(app.config().logging.level, "debug");
        assert_eq!(app.config().logging.format, "compact");
        assert!(app.config().engine.cancel_on_timeout);
    }
}
