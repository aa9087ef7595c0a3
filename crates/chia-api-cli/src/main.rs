//! Chia API CLI - inspect a running Chia daemon through the query layer.
//!
//! Every subcommand opens one shared daemon connection. `call` and `fetch`
//! print a single response; `watch`, `query` and `keep` run until Ctrl-C.

use anyhow::{anyhow, bail, Context, Result};
use chia_api::hooks::{merge_harvesters, throttle, DesiredState, ServiceReconciler, ThrottleOptions};
use chia_api::{ChiaApi, ClientConfig, RequestDescriptor, ServiceHandle, Target};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "chia-api")]
#[command(about = "Query and watch a Chia daemon")]
struct Args {
    /// Daemon WebSocket URL (overrides the Chia root config)
    #[arg(long)]
    url: Option<String>,

    /// Client certificate (PEM), used with --url
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Client private key (PEM), used with --url
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Chia root directory (defaults to $CHIA_ROOT or ~/.chia/mainnet)
    #[arg(long)]
    chia_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one command to a service (or `client`) with positional JSON args
    Call {
        target: String,
        command: String,
        args: Vec<String>,
    },
    /// Run a named endpoint once
    Fetch {
        endpoint: String,
        /// Endpoint arguments as a JSON object or array
        #[arg(default_value = "null")]
        args: String,
    },
    /// Print every push of one event
    Watch { target: String, event: String },
    /// Keep a cached query open and print its state as it changes
    Query {
        endpoint: String,
        #[arg(default_value = "null")]
        args: String,
        /// Print at most once per this many milliseconds
        #[arg(long, default_value = "0")]
        throttle_ms: u64,
    },
    /// Summarize plots across all harvesters known to the farmer
    Plots,
    /// Keep a service running or stopped (running | stopped | unmanaged)
    Keep { service: String, desired: String },
    /// List endpoint names
    Endpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let api = ChiaApi::new();

    if let Command::Endpoints = args.command {
        for name in api.endpoint_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = client_config(&args)?;
    info!("Using daemon at {}", config.url);
    api.initialize_config(config);

    let outcome = run(&api, args.command).await;
    api.shutdown().await;
    outcome
}

fn client_config(args: &Args) -> Result<ClientConfig> {
    if let Some(url) = &args.url {
        let config = match (&args.cert, &args.key) {
            (Some(cert), Some(key)) => ClientConfig::new(url.clone()).with_credentials(cert, key),
            _ => ClientConfig::new(url.clone()),
        };
        config.validate()?;
        return Ok(config);
    }

    let root = match &args.chia_root {
        Some(root) => root.clone(),
        None => ClientConfig::default_chia_root()
            .ok_or_else(|| anyhow!("Cannot locate the Chia root; pass --chia-root or --url"))?,
    };
    ClientConfig::from_chia_root(&root)
        .with_context(|| format!("Failed to load config from {}", root.display()))
}

async fn run(api: &ChiaApi, command: Command) -> Result<()> {
    match command {
        Command::Call {
            target,
            command,
            args,
        } => {
            let values = args
                .iter()
                .map(|arg| parse_json(arg))
                .collect::<Result<Vec<_>>>()?;
            let request = descriptor(&target, command)?.args(values);
            let data = api.execute(request).await.into_data()?;
            print_json(&data)
        }
        Command::Fetch { endpoint, args } => {
            let data = api.fetch(&endpoint, &parse_json(&args)?).await?;
            print_json(&data)
        }
        Command::Watch { target, event } => {
            let request = descriptor(&target, event)?.with_callback(Arc::new(|payload: Value| {
                match serde_json::to_string(&payload) {
                    Ok(text) => println!("{}", text),
                    Err(e) => eprintln!("Failed to encode event: {}", e),
                }
            }));
            let unsubscribe = api.execute(request).await.into_subscription()?;
            tokio::signal::ctrl_c().await?;
            unsubscribe.unsubscribe();
            Ok(())
        }
        Command::Query {
            endpoint,
            args,
            throttle_ms,
        } => {
            let subscription = api.query(&endpoint, parse_json(&args)?)?;
            let options = ThrottleOptions::new(Duration::from_millis(throttle_ms));
            let (mut states, task) = throttle(subscription.watch(), options);

            loop {
                tokio::select! {
                    state = states.recv() => match state {
                        Some(state) => match (&state.data, &state.error) {
                            (_, Some(error)) => eprintln!("error: {}", error),
                            (Some(data), None) => print_json(data)?,
                            (None, None) => {}
                        },
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            task.abort();
            subscription.release();
            Ok(())
        }
        Command::Plots => {
            let harvesters = api.fetch("getHarvesters", &Value::Null).await?;
            let list = harvesters.as_array().cloned().unwrap_or_default();
            let summary = merge_harvesters(&list)?;
            println!(
                "{} plots, {} bytes",
                summary.plot_count(),
                summary.total_file_size
            );
            for (size, count) in summary.counts_by_size.iter().rev() {
                println!("  k{}: {}", size, count);
            }
            if summary.has_problems() {
                println!(
                    "{} failed to open, {} without keys, {} duplicates",
                    summary.failed_to_open.len(),
                    summary.not_found.len(),
                    summary.duplicates.len()
                );
            }
            Ok(())
        }
        Command::Keep { service, desired } => {
            let handle = ServiceHandle::parse(&service)
                .ok_or_else(|| anyhow!("Unknown service: {}", service))?;
            let desired: DesiredState = desired.parse()?;
            let reconciler =
                ServiceReconciler::new(Arc::new(api.clone()), handle.service_name(), desired);
            let running = reconciler.spawn();
            let mut status = running.status_changes();

            loop {
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        info!("{} is {:?}", service, *status.borrow_and_update());
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok(())
        }
        Command::Endpoints => Ok(()),
    }
}

fn descriptor(target: &str, command: String) -> Result<RequestDescriptor> {
    match parse_target(target)? {
        Target::Client => Ok(RequestDescriptor::client(command)),
        Target::Service(handle) => Ok(RequestDescriptor::service(handle, command)),
    }
}

fn parse_target(target: &str) -> Result<Target> {
    if target == "client" {
        return Ok(Target::Client);
    }
    match ServiceHandle::parse(target) {
        Some(handle) => Ok(Target::Service(handle)),
        None => bail!("Unknown target: {} (expected client or a service name)", target),
    }
}

fn parse_json(text: &str) -> Result<Value> {
    // Bare words are taken as strings.
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
