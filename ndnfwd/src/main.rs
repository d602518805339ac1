use std::process;

use clap::{Arg, Command};
use log::{error, info};
use tokio::signal;

mod config;
mod daemon;
mod service;
mod transport;

use config::Config;
use daemon::Daemon;
use service::Service;

#[tokio::main]
async fn main() {
    let matches = Command::new("ndnfwd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("NDN Forwarding Daemon")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/ndnfw/ndnfwd.conf"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = match matches.get_one::<String>("config") {
        Some(path) => path.clone(),
        None => unreachable!("config has a default value"),
    };
    let dry_run = matches.get_flag("dry-run");

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration {}: {}", config_path, e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if dry_run {
        info!("configuration {} is valid", config_path);
        return;
    }

    info!("starting ndnfwd, config: {}", config_path);
    let daemon = Daemon::new(config);

    if let Err(e) = daemon.start().await {
        error!("failed to start daemon: {}", e);
        process::exit(1);
    }

    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for ctrl+c: {}", e);
    }

    info!("shutting down ndnfwd");
    if let Err(e) = daemon.stop().await {
        error!("failed to stop daemon cleanly: {}", e);
    }
}
