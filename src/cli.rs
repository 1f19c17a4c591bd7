//! cli is a module definining and handling the command line arguments
//! of the `anvil` program.
//!
//! All new arguments and commands should be specified in this module.
//! The module uses the [clap] crate underneath.
//!
//! # Example Usage
//!
//! To parse the arguments and run the `anvil` program with these
//! arguments simply do:
//!
//! ```rust
//! Cli::parse().run();
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::exit;

use anvil_lib::session::SessionConfig;
use clap::{Parser, Subcommand};

use crate::proto::dns::{RECORD_TYPE_A, RECORD_TYPE_AAAA};
use crate::scenario;

/// A structure holding parsed program arguments.
#[derive(Parser)]
#[command(name = "anvil")]
#[command(author = "Marcin Siodelski")]
#[command(about = "DHCP conformance testing toolkit", long_about=None)]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    commands: Option<Commands>,
}

/// An enum that defines the supported subcommands.
#[derive(Subcommand)]
enum Commands {
    /// This command runs the four message DHCPv4 exchange (DISCOVER,
    /// OFFER, REQUEST, ACK) with a renewal against the tested server.
    ProbeV4 {
        /// Session configuration file location (JSON).
        #[arg(short, long)]
        config: Option<String>,
        /// Address of the tested server, overriding the configuration.
        #[arg(short, long)]
        server: Option<Ipv4Addr>,
        /// The pool address the offer is expected to carry.
        #[arg(short, long)]
        expect_address: Option<Ipv4Addr>,
    },
    /// This command runs the four message DHCPv6 exchange (SOLICIT,
    /// ADVERTISE, REQUEST, REPLY) with a renewal against the tested server.
    ProbeV6 {
        /// Session configuration file location (JSON).
        #[arg(short, long)]
        config: Option<String>,
        /// Address of the tested server, overriding the configuration.
        #[arg(short, long)]
        server: Option<Ipv6Addr>,
        /// The pool address the advertise is expected to carry.
        #[arg(short, long)]
        expect_address: Option<Ipv6Addr>,
    },
    /// This command queries the configured DNS server and checks the
    /// answer section, verifying a DDNS registration or removal.
    VerifyDns {
        /// Session configuration file location (JSON).
        #[arg(short, long)]
        config: Option<String>,
        /// The queried name.
        #[arg(short, long)]
        name: String,
        /// Query the AAAA record instead of the A record.
        #[arg(long)]
        aaaa: bool,
        /// Expect an empty answer section, e.g. after a RELEASE.
        #[arg(long)]
        expect_absent: bool,
    },
}

impl Cli {
    /// Runs the program for the specified arguments.
    ///
    /// # Example Usage
    ///
    /// ```rust
    /// Cli::parse().run();
    /// ```
    ///
    /// The function blocks until the exchanges complete or the listen
    /// window elapses. A failed expectation terminates the program with
    /// a non-zero status.
    pub fn run(self) {
        if let Some(commands) = self.commands {
            match commands {
                Commands::ProbeV4 {
                    config,
                    server,
                    expect_address,
                } => {
                    let mut config = load_config(config);
                    if let Some(server) = server {
                        config.server_addr_v4 = server;
                    }
                    if let Some(expect_address) = expect_address {
                        config.expected_address_v4 = Some(expect_address);
                    }
                    match scenario::dora(&config) {
                        Ok(address) => println!("acquired address {}", address),
                        Err(error) => {
                            eprintln!("DHCPv4 probe failed: {}", error);
                            exit(1);
                        }
                    }
                }
                Commands::ProbeV6 {
                    config,
                    server,
                    expect_address,
                } => {
                    let mut config = load_config(config);
                    if let Some(server) = server {
                        config.server_addr_v6 = server;
                    }
                    if let Some(expect_address) = expect_address {
                        config.expected_address_v6 = Some(expect_address);
                    }
                    match scenario::sarr(&config) {
                        Ok(address) => println!("acquired address {}", address),
                        Err(error) => {
                            eprintln!("DHCPv6 probe failed: {}", error);
                            exit(1);
                        }
                    }
                }
                Commands::VerifyDns {
                    config,
                    name,
                    aaaa,
                    expect_absent,
                } => {
                    let config = load_config(config);
                    let record_type = if aaaa { RECORD_TYPE_AAAA } else { RECORD_TYPE_A };
                    match scenario::verify_dns(&config, &name, record_type, !expect_absent) {
                        Ok(answers) => {
                            for answer in &answers {
                                println!("{} {} {}", answer.name, answer.ttl, answer.rdata);
                            }
                            if answers.is_empty() {
                                println!("no answers");
                            }
                        }
                        Err(error) => {
                            eprintln!("DNS verification failed: {}", error);
                            exit(1);
                        }
                    }
                }
            }
        }
    }
}

/// Loads the session configuration, falling back to the defaults.
fn load_config(path: Option<String>) -> SessionConfig {
    match path {
        Some(path) => match SessionConfig::load(&path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("{}", error);
                exit(128);
            }
        },
        None => SessionConfig::default(),
    }
}
