use std::fs;

use clap::Parser;
use keel::NFSServer;
use tracing::Level;

mod config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the server YAML configuration
    config: String,
    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<String>,
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    }

    let contents = fs::read_to_string(&cli.config)?;
    let config: config::Config = serde_yaml::from_str(&contents)?;

    let mut builder = NFSServer::builder();
    if let Some(bind) = cli.bind.or(config.bind) {
        builder = builder.bind(&bind);
    }
    if let Some(seconds) = config.lease_seconds {
        builder = builder.lease_seconds(seconds);
    }
    if let Some(seconds) = config.grace_seconds {
        builder = builder.grace_seconds(seconds);
    }
    if let Some(domain) = config.domain {
        builder = builder.identity_domain(&domain);
    }
    if let Some(path) = config.client_list {
        builder = builder.client_list(path);
    }
    for share in config.shares {
        builder = builder.share(share.into_share()?);
    }

    builder.build().start();
    Ok(())
}
