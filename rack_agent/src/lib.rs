//! Fake library entry for the `rack_agent` crate.
//!
//! Houses the command-line interface for the `rack_agent` binary, so that integration
//! tests can run the agent in-process.

extern crate core;

pub mod handler;
pub mod neighbours;
pub mod server;
pub mod validation;

use std::env;

use clap::{Parser, Subcommand};

use server::ServiceOptions;

/// Top-level CLI parser for `rack_agent`.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands available for `rack_agent` execution.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer signed scan requests from the region.
    Service(ServiceOptions),

    /// Print the neighbours the agent would currently report for the given CIDRs.
    Neighbours {
        /// Neighbour table to read.
        #[arg(long = "neighbours-file", default_value = neighbours::DEFAULT_NEIGHBOURS_FILE)]
        neighbours_file: String,
        /// CIDRs to filter by.
        cidrs: Vec<String>,
    },
}

pub fn inner_main(invocation: Cli) {
    match invocation.command {
        Command::Service(args) => {
            if let Err(e) = server::start_rack_agent(args) {
                eprintln!("Error running rack_agent: {e}");
            }
        }
        Command::Neighbours {
            neighbours_file,
            cidrs,
        } => match neighbours::scan_file(&neighbours_file, &cidrs) {
            Ok(found) => {
                for discovery in found {
                    println!("{} {}", discovery.ip, discovery.mac);
                }
            }
            Err(e) => eprintln!("Error reading neighbours: {e}"),
        },
    }
}
