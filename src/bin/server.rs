//! dns-tunnel-server: runs the resolver until interrupted, then prints the
//! reconstructed payload and any missing sequence numbers.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dns_tunnel::config::{TransportKind, TunnelConfig};
use dns_tunnel::server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dns-tunnel-server")]
#[command(author = "Sina Rabbani")]
#[command(version = VERSION)]
#[command(about = "Covert DNS label tunnel server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Domain suffix this server answers for (overrides config file)
    #[arg(long)]
    domain: Option<String>,

    /// Listen address (overrides config file)
    #[arg(long)]
    listen_address: Option<IpAddr>,

    /// Listen port (overrides config file, for whichever transport is active)
    #[arg(long)]
    listen_port: Option<u16>,

    /// Transport to accept queries over (overrides config file)
    #[arg(long, value_enum)]
    transport: Option<CliTransport>,

    /// Enable verbose logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliTransport {
    Udp,
    Tcp,
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => TunnelConfig::from_file(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => TunnelConfig::default(),
    };
    if let Some(domain) = cli.domain {
        config.domain = domain;
    }
    if let Some(addr) = cli.listen_address {
        config.listen_address = addr;
    }
    if let Some(port) = cli.listen_port {
        match config.transport {
            TransportKind::Udp => config.udp_port = port,
            TransportKind::Tcp => config.tcp_port = port,
        }
    }
    if let Some(transport) = cli.transport {
        config.transport = match transport {
            CliTransport::Udp => TransportKind::Udp,
            CliTransport::Tcp => TransportKind::Tcp,
        };
    }
    config.validate().context("invalid configuration")?;

    server::run(config).await
}
