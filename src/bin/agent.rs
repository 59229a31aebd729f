//! dns-tunnel-agent: reads one line of message from standard input, resets
//! the server's session, and smuggles the message through the tunnel.

use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dns_tunnel::agent;
use dns_tunnel::config::{TransportKind, TunnelConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dns-tunnel-agent")]
#[command(author = "Sina Rabbani")]
#[command(version = VERSION)]
#[command(about = "Covert DNS label tunnel agent", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Domain suffix queries are rooted under (overrides config file)
    #[arg(long)]
    domain: Option<String>,

    /// Server address to resolve against (overrides config file)
    #[arg(long)]
    server: Option<IpAddr>,

    /// Transport to carry queries over (overrides config file)
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
    if let Some(server) = cli.server {
        config.listen_address = server;
    }
    if let Some(transport) = cli.transport {
        config.transport = match transport {
            CliTransport::Udp => TransportKind::Udp,
            CliTransport::Tcp => TransportKind::Tcp,
        };
    }
    config.validate().context("invalid configuration")?;

    let reset_ok = agent::perform_reset(&config)
        .await
        .context("reset handshake failed")?;
    if !reset_ok {
        log::error!("reset failed, aborting");
        std::process::exit(1);
    }

    println!("Enter your message: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading message from stdin")?;
    let message = line.trim_end_matches(['\n', '\r']).as_bytes();

    agent::transfer(&config, message)
        .await
        .context("transfer failed")?;

    println!("All chunks sent and acknowledged.");
    Ok(())
}
