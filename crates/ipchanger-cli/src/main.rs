//! ipchanger - Main entry point
//!
//! Finds ONVIF cameras on a subnet and changes their IPv4 address,
//! gateway and DHCP settings.

mod commands;
mod config;
mod local;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ipchanger_core::{Credentials, Ipv4Cidr};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::commands::{App, ChangeIpArgs};

#[derive(Parser, Debug)]
#[command(name = "ipchanger")]
#[command(about = "ONVIF camera discovery and network reconfiguration")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ipchanger.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// ONVIF username (overrides the configuration file)
    #[arg(short, long)]
    username: Option<String>,

    /// ONVIF password
    #[arg(short, long, env = "IPCHANGER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a network range for ONVIF cameras
    Scan {
        /// Range to scan, e.g. 192.168.1.0/24
        #[arg(short, long)]
        network: Option<Ipv4Cidr>,

        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show identity and network settings of one camera
    Inspect {
        address: Ipv4Addr,

        /// Also print the raw network interface response
        #[arg(short, long)]
        verbose: bool,
    },

    /// Give a camera a new static IPv4 address
    ChangeIp {
        /// Current address of the camera
        address: Ipv4Addr,

        /// Address to assign
        #[arg(long = "new")]
        new_address: Ipv4Addr,

        #[arg(short, long)]
        gateway: Option<Ipv4Addr>,

        /// Prefix length of the new subnet
        #[arg(long)]
        prefix: Option<u8>,

        /// Interface token to reconfigure
        #[arg(short, long)]
        interface: Option<String>,

        /// Accept a gateway outside the new subnet
        #[arg(long)]
        allow_foreign_gateway: bool,

        /// Active range used to derive the default gateway
        #[arg(short, long)]
        network: Option<Ipv4Cidr>,
    },

    /// Enable or disable DHCP on a camera
    Dhcp {
        address: Ipv4Addr,

        mode: DhcpMode,

        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Write a default configuration file
    InitConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DhcpMode {
    Enable,
    Disable,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("ipchanger v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig = args.command {
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = config::load_config(&args.config)?;

    let username = args
        .username
        .unwrap_or_else(|| config.credentials.username.clone());
    let credentials = args
        .password
        .or_else(|| config.credentials.password.clone())
        .map(|password| Credentials::new(username, password));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    let mut app = App::new(config, credentials, cancel)?;

    let succeeded = match args.command {
        Command::Scan { network, json } => {
            app.scan(network, json).await?;
            true
        }
        Command::Inspect { address, verbose } => {
            app.inspect(address, verbose).await?;
            true
        }
        Command::ChangeIp {
            address,
            new_address,
            gateway,
            prefix,
            interface,
            allow_foreign_gateway,
            network,
        } => {
            app.change_ip(ChangeIpArgs {
                current: address,
                new_address,
                gateway,
                prefix,
                interface,
                network,
                allow_foreign_gateway,
            })
            .await?
        }
        Command::Dhcp {
            address,
            mode,
            interface,
        } => {
            app.dhcp(address, matches!(mode, DhcpMode::Enable), interface)
                .await?
        }
        Command::InitConfig => true,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
