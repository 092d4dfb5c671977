//! Entrypoint for the `region` binary.

use clap::Parser as _;

use metalfleet_region::{cli::Cli, inner_main};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    inner_main(Cli::parse()).await
}
