//! Command-line interface of the `region` binary.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the region API service.
    RegionService(ServiceArgs),
}

/// Output format of the service log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "METALFLEET_REGION_CONFIG_PATH",
        default_value = "metalfleet_region.toml"
    )]
    pub config: String,

    /// Optional override for the listen port (overrides port in config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}
