#![warn(missing_docs)]

//! anvil is a DHCP conformance testing toolkit.

use clap::Parser;
use cli::Cli;

pub mod cli;
pub mod exchange;
pub mod expect;
pub mod proto;
pub mod scenario;
pub mod transport;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    cli.run();
}
