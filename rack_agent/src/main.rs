//! Entrypoint for the `rack_agent` binary.

use clap::Parser as _;

use metalfleet_rack_agent::{Cli, inner_main};

fn main() {
    let invocation = Cli::parse();
    inner_main(invocation);
}
