//! Gridsync - collaborative spreadsheet client

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use gridsync::config::{Config, load_config};
use gridsync::console::{ConsoleAction, HELP, parse_line};
use gridsync::identity::{default_identity_path, load_or_create_identity, save_identity};
use gridsync::logging;
use gridsync_core::Workbook;
use gridsync_engine::engine::{ERROR_SENTINEL, evaluate_expression};
use gridsync_sync::{ClientOptions, Command, Notice, Replica, run_client, run_offline};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn print_usage() {
    eprintln!("Usage: gridsync [OPTIONS] [SNAPSHOT]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [SNAPSHOT]                Workbook snapshot to open and save (.json)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <FORMULA>   Evaluate one formula and print its value");
    eprintln!("  --relay <ADDR>            Relay address (default: 127.0.0.1:8080)");
    eprintln!("  --name <NAME>             Display name shown to other users");
    eprintln!("  --offline                 Do not connect to a relay");
    eprintln!("  --config <PATH>           Config file (default: <config dir>/config.toml)");
    eprintln!("  -v, --verbose             Debug logging");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default)]
struct Options {
    snapshot: Option<PathBuf>,
    relay: Option<String>,
    name: Option<String>,
    offline: bool,
    config: Option<PathBuf>,
    verbose: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut options = Options::default();
    let mut command: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "-c" | "--command" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --command requires a formula");
                    std::process::exit(1);
                }
                command = Some(args[i].to_string());
            }
            "--relay" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --relay requires an address");
                    std::process::exit(1);
                }
                options.relay = Some(args[i].to_string());
            }
            "--name" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --name requires a value");
                    std::process::exit(1);
                }
                options.name = Some(args[i].to_string());
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
                options.config = Some(PathBuf::from(&args[i]));
            }
            "--offline" => options.offline = true,
            "-v" | "--verbose" => options.verbose = true,
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                print_usage();
                std::process::exit(1);
            }
            _ => {
                if options.snapshot.is_none() {
                    options.snapshot = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: Unexpected argument: {}", args[i]);
                    print_usage();
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }

    // Command mode: evaluate and exit, no config or network involved.
    if let Some(formula) = command {
        let value = evaluate_expression(&formula);
        println!("{}", value);
        if value == ERROR_SENTINEL {
            std::process::exit(1);
        }
        return;
    }

    let (config, warnings) = load_config(options.config.as_deref());
    logging::init(&config.log_level, options.verbose);
    for warning in warnings {
        tracing::warn!("{}", warning);
    }

    if let Err(e) = run(options, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn open_workbook(path: Option<PathBuf>) -> anyhow::Result<Workbook> {
    let Some(path) = path else {
        return Ok(Workbook::new());
    };
    Workbook::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn run(options: Options, config: Config) -> anyhow::Result<()> {
    let snapshot = options.snapshot.clone().or_else(|| config.client.snapshot_path());
    let workbook = open_workbook(snapshot)?;

    let identity_path = default_identity_path();
    let (mut identity, warnings) = load_or_create_identity(identity_path.as_deref());
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
    if let Some(name) = options.name.clone().or_else(|| config.client.name.clone()) {
        identity.user_name = name;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let replica = runtime.block_on(console(options, config, Replica::new(identity, workbook)))?;

    let identity = replica.identity().clone();
    let mut workbook = replica.into_workbook();
    if let Err(e) = workbook.save_if_modified() {
        tracing::warn!(error = %e, "failed to save snapshot");
    }
    save_identity(identity_path.as_deref(), &identity).context("saving identity")?;
    Ok(())
}

async fn console(options: Options, config: Config, replica: Replica) -> anyhow::Result<Replica> {
    let (commands, command_rx) = mpsc::channel::<Command>(32);
    let (notice_tx, mut notices) = mpsc::channel::<Notice>(128);

    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            println!("{}", notice);
        }
    });

    println!(
        "gridsync: {} on {} (:help for commands)",
        replica.identity().user_name,
        replica.workbook().current_page_id()
    );

    let client = if options.offline {
        tokio::spawn(async move {
            Ok::<_, gridsync_sync::SyncError>(run_offline(replica, command_rx, notice_tx).await)
        })
    } else {
        let relay = options.relay.unwrap_or_else(|| config.client.relay.clone());
        let mut client_options = ClientOptions::new(&relay);
        client_options.reconnect_delay = config.client.reconnect_delay();
        client_options.connect_timeout = config.client.connect_timeout();
        tokio::spawn(run_client(client_options, replica, command_rx, notice_tx))
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match parse_line(&line) {
            Ok(ConsoleAction::Command(command)) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            Ok(ConsoleAction::Help) => println!("{}", HELP),
            Ok(ConsoleAction::Quit) => break,
            Ok(ConsoleAction::Nothing) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    drop(commands);
    let replica = client.await.context("client task panicked")??;
    printer.await.context("printer task panicked")?;
    Ok(replica)
}
