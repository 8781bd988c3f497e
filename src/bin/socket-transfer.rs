//! CLI entry point.
//!
//! Grounded on the teacher's `src/main.rs`: parse a single required
//! config-file-path argument, initialize logging, load the configuration,
//! build the supervisor, and run until interrupted.

use std::fs;
use std::net::SocketAddr;
use std::process;

use clap::Parser;
use log::{error, info};

use socket_transfer::config;
use socket_transfer::supervisor::{Options, TransferSupervisor};
use socket_transfer::Event;

#[derive(Parser, Debug)]
#[command(name = "socket-transfer", about = "A TCP load-balancing relay with health-checked targets")]
struct Args {
    /// Path to a JSON or YAML configuration document.
    config_path: String,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let text = match fs::read_to_string(&args.config_path) {
        Ok(text) => text,
        Err(e) => {
            error!("could not read {}: {}", args.config_path, e);
            process::exit(1);
        }
    };

    let cfg = match config::from_str(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(1);
        }
    };

    let heartbeat = match &cfg.heartbeat {
        config::HeartbeatConfig::Single(v) => vec![*v],
        config::HeartbeatConfig::Schedule(vs) => vs.clone(),
    };

    let options = Options {
        port: cfg.port,
        address: cfg.address,
        bind: cfg.bind,
        strategy: cfg.strategy,
        targets: cfg.targets(),
        heartbeat,
    };

    let mut supervisor = match TransferSupervisor::new(options) {
        Ok(s) => s,
        Err(e) => {
            error!("could not construct supervisor: {}", e);
            process::exit(1);
        }
    };

    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    match supervisor.listen(None).await {
        Ok(port) => info!("listening on {}", SocketAddr::new(cfg.address, port)),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
    if let Some(e) = supervisor.stop().await {
        error!("{}", e);
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ErrorLoadBalancer { message } => error!("error:loadbalancer {}", message),
        Event::ErrorServerLocal { message } => error!("error:server:local {}", message),
        Event::ErrorServerRemote { message, port } => error!("error:server:remote {} ({})", message, port),
        Event::ErrorSocketTransfer { message } => error!("error:socket:transfer {}", message),
        Event::ErrorHealthHeck { message } => error!("error:health:heck {}", message),
        Event::HealthCheckFailed { targets } => {
            let ids: Vec<u16> = targets.iter().map(|t| t.id()).collect();
            error!("health:check:failed {:?}", ids);
        }
    }
}
