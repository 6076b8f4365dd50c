mod config;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, LevelFilter};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use zidaq::{poll_flags, ApiLevel, DaqClient, NodePath, ZiValue};

use crate::config::{load_config, AppConfig};

/// Command line access to the data-server node tree
#[derive(Parser, Debug)]
#[command(name = "node-tool")]
#[command(about = "Browse, read, write and poll data-server nodes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the nodes below a path
    List {
        /// Root of the listing, e.g. /dev2006/demods
        path: String,
        /// Descend into the whole subtree
        #[arg(short, long)]
        recursive: bool,
    },
    /// Read node values; wildcards return every match
    Get {
        path: String,
    },
    /// Write a node value
    Set {
        path: String,
        value: String,
        /// Force the value type instead of guessing (int, double, string)
        #[arg(short, long, value_name = "TYPE")]
        r#type: Option<String>,
    },
    /// Subscribe to sample nodes and print polled data until Ctrl+C
    Poll {
        /// Nodes to subscribe, e.g. /dev2006/demods/0/sample
        paths: Vec<String>,
        /// Recording length of each poll in seconds
        #[arg(short, long, default_value_t = 0.1)]
        duration: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.console.verbosity.clone());
    initialize_logging(&log_level);

    let mut client = connect(&config)?;
    info!(
        "Connected to data server {}:{} (version {})",
        config.server.host,
        config.server.port,
        client.server_version()
    );

    match args.command {
        Command::List { path, recursive } => cmd_list(&mut client, &path, recursive),
        Command::Get { path } => cmd_get(&mut client, &path),
        Command::Set { path, value, r#type } => cmd_set(&mut client, &path, &value, r#type.as_deref()),
        Command::Poll { paths, duration } => cmd_poll(&mut client, &paths, duration),
    }
}

fn connect(config: &AppConfig) -> Result<DaqClient, Box<dyn std::error::Error>> {
    let api_level = ApiLevel::try_from(config.server.api_level)?;
    let mut client = DaqClient::builder()
        .host(&config.server.host)
        .port(config.server.port)
        .api_level(api_level)
        .connect()?;
    client.check_server_version()?;

    if let Some(serial) = &config.device.serial {
        let interface = config.device.interface.as_deref().unwrap_or("");
        let props = client.connect_device(serial, interface)?;
        info!(
            "Device {} ({}, options: {})",
            serial,
            props.devtype,
            props.options.join("|")
        );
    }
    Ok(client)
}

fn cmd_list(
    client: &mut DaqClient,
    path: &str,
    recursive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = NodePath::parse(path)?;
    let nodes = client.list_nodes(&path, recursive)?;
    for node in &nodes {
        println!("{node}");
    }
    info!("{} nodes", nodes.len());
    Ok(())
}

fn cmd_get(client: &mut DaqClient, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = NodePath::parse(path)?;
    for (node, value) in client.get(&path)? {
        println!("{node} = {}", format_value(&value));
    }
    Ok(())
}

fn cmd_set(
    client: &mut DaqClient,
    path: &str,
    value: &str,
    forced_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = NodePath::parse(path)?;
    match forced_type {
        Some("int") => client.set_int(&path, value.parse()?)?,
        Some("double") => client.set_double(&path, value.parse()?)?,
        Some("string") => client.set_string(&path, value)?,
        Some(other) => return Err(format!("unknown value type '{other}'").into()),
        // No type given, guess from the literal.
        None => {
            if let Ok(int) = value.parse::<i64>() {
                client.set_int(&path, int)?;
            } else if let Ok(double) = value.parse::<f64>() {
                client.set_double(&path, double)?;
            } else {
                client.set_string(&path, value)?;
            }
        }
    }
    client.sync()?;
    info!("Set {path} to {value}");
    Ok(())
}

fn cmd_poll(
    client: &mut DaqClient,
    paths: &[String],
    duration: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    if paths.is_empty() {
        return Err("poll needs at least one path".into());
    }
    for path in paths {
        let path = NodePath::parse(path)?;
        client.subscribe(&path)?;
        info!("Subscribed to {path}");
    }
    client.sync()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = running.clone();
    ctrlc::set_handler(move || {
        running_flag.store(false, Ordering::SeqCst);
    })?;
    info!("Polling, press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        let result = client.poll(
            Duration::from_secs_f64(duration),
            Duration::from_millis(500),
            poll_flags::NONE,
        )?;
        for path in result.paths() {
            let burst = result.demod_samples(path)?;
            if let (Some(first), Some(last)) = (burst.samples.first(), burst.samples.last()) {
                println!(
                    "{path}: {} samples, r = {:.6e} .. {:.6e}",
                    burst.samples.len(),
                    first.r(),
                    last.r()
                );
            }
        }
        if !result.lossless() {
            log::warn!("Sample loss detected, data may have gaps");
        }
    }

    client.unsubscribe_all()?;
    Ok(())
}

fn format_value(value: &ZiValue) -> String {
    match value {
        ZiValue::I64(v) => v.to_string(),
        ZiValue::F64(v) => format!("{v:e}"),
        ZiValue::String(v) => v.clone(),
        ZiValue::VecF64(v) => format!("vector of {} doubles", v.len()),
        other => format!("{other:?}"),
    }
}

fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        other => {
            eprintln!("Warning: Invalid log level '{other}', using 'info'");
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}
