use log::{error, info};
use smtpsink::{ServerConfig, SmtpServer};
use std::env;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    let addr = if args.len() > 1 {
        args[1].as_str()
    } else {
        "127.0.0.1:2525"
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Starting smtpsink on {addr}");
    info!("Hostname: {}", config.hostname);
    info!("Receive timeout: {:?}", config.receive_timeout);
    if config.output_to_file {
        info!("Writing messages to {}", config.output_dir.display());
    } else {
        info!("File output disabled");
    }

    let server = SmtpServer::from_config(config);
    if let Err(e) = server.start(addr) {
        error!("Failed to start server: {e}");
        std::process::exit(1);
    }
}
