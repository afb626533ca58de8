//! Gridsync relay - fans edits and presence out to every connected client

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use gridsync::config::load_config;
use gridsync::logging;
use gridsync_core::Workbook;
use gridsync_sync::{Relay, serve};
use tokio::net::TcpListener;

fn print_usage() {
    eprintln!("Usage: gridsync-relay [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --listen <ADDR>           Address to listen on (default: 127.0.0.1:8080)");
    eprintln!("  --snapshot <PATH>         Load the mirror from, and save it to, this file");
    eprintln!("  --config <PATH>           Config file (default: <config dir>/config.toml)");
    eprintln!("  -v, --verbose             Debug logging");
    eprintln!("  -h, --help                Print help");
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut listen: Option<String> = None;
    let mut snapshot: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--listen" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --listen requires an address");
                    std::process::exit(1);
                }
                listen = Some(args[i].to_string());
            }
            "--snapshot" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --snapshot requires a file path");
                    std::process::exit(1);
                }
                snapshot = Some(PathBuf::from(&args[i]));
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            "-v" | "--verbose" => verbose = true,
            arg => {
                eprintln!("Error: Unknown argument: {}", arg);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let (config, warnings) = load_config(config_path.as_deref());
    logging::init(&config.log_level, verbose);
    for warning in warnings {
        tracing::warn!("{}", warning);
    }

    let listen = listen.unwrap_or(config.relay.listen);
    let snapshot = snapshot.or(config.relay.snapshot);
    if let Err(e) = run(&listen, snapshot) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_mirror(snapshot: Option<PathBuf>) -> anyhow::Result<Workbook> {
    let Some(path) = snapshot else {
        return Ok(Workbook::new());
    };
    let mirror = Workbook::open(&path).with_context(|| format!("opening {}", path.display()))?;
    tracing::info!(path = %path.display(), cells = mirror.store().len(), "relay snapshot");
    Ok(mirror)
}

fn run(listen: &str, snapshot: Option<PathBuf>) -> anyhow::Result<()> {
    let mirror = load_mirror(snapshot)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;

    runtime.block_on(async {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("binding {}", listen))?;
        tokio::select! {
            result = serve(listener, Relay::with_mirror(mirror)) => result?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                tracing::info!("shutting down");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
