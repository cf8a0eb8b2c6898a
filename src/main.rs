//! # spsrv - Entry Point
//! src/main.rs
//!
//! Lee la configuración (archivo + flags), abre el puerto y atiende
//! conexiones hasta que el proceso termine.

use std::process;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use spsrv::config::{Cli, Config};
use spsrv::server::Server;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    println!("=================================");
    println!("  spsrv {} - Spartan server", env!("CARGO_PKG_VERSION"));
    println!("=================================\n");

    info!("Configuration:");
    config.log_summary();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Cannot listen: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!("Fatal error: {}", e);
        process::exit(1);
    }
}
