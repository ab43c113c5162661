// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for conductor

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Run dependency-ordered task plans with timeouts, retries and critical-task abort")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan from a YAML file
    Run {
        #[arg(help = "Path to plan YAML file")]
        plan: PathBuf,

        #[arg(short = 'V', long = "var", help = "Override run variables (key=value)")]
        vars: Vec<String>,

        #[arg(long, help = "Dry run - validate and print the order without executing")]
        dry_run: bool,

        #[arg(short, long, help = "Write run results as JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Validate a plan file and print its execution order
    Validate {
        #[arg(help = "Path to plan YAML file")]
        plan: PathBuf,
    },

    /// List the available task types
    Tasks,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse variables from key=value format
    pub fn parse_variables(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
        let mut variables = HashMap::new();

        for var in vars {
            match var.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    variables.insert(key.trim().to_string(), value.to_string());
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "Invalid variable format '{}'. Expected 'key=value'",
                        var
                    ));
                }
            }
        }

        Ok(variables)
    }
}
