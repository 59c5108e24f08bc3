//! edgedb-ping: check that an EdgeDB server accepts a connection.
//!
//! Opens the transport, runs the protocol handshake (including SCRAM when the
//! server asks for it), reports the outcome and disconnects.
//!
//! # Usage
//!
//! ```bash
//! # Local server, trust auth
//! edgedb-ping -u edgedb
//!
//! # Named instance from the credentials directory
//! edgedb-ping -I my_instance
//!
//! # Explicit credentials file, handshake trace
//! RUST_LOG=qail_edgedb=trace edgedb-ping --credentials-file ./creds.json -v
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use qail_edgedb::config::{DEFAULT_HOST, DEFAULT_PORT};
use qail_edgedb::{Credentials, EdgeConfig, EdgeConnection, EdgeError, TlsConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "edgedb-ping")]
#[command(version)]
#[command(about = "Check that an EdgeDB server accepts a connection", long_about = None)]
struct Cli {
    /// Named instance; credentials are read from the config directory
    #[arg(short = 'I', long, conflicts_with = "credentials_file")]
    instance: Option<String>,

    /// Path to a credentials JSON file
    #[arg(long)]
    credentials_file: Option<PathBuf>,

    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "edgedb")]
    user: String,

    /// Defaults to the user name
    #[arg(short, long)]
    database: Option<String>,

    #[arg(long, env = "EDGEDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Connect over a Unix domain socket instead of TCP
    #[arg(long)]
    unix_path: Option<PathBuf>,

    /// Use TLS with the platform trust store
    #[arg(long)]
    tls: bool,

    /// Trust only the certificates in this PEM file (implies --tls)
    #[arg(long)]
    tls_ca_file: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Log the handshake to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qail_edgedb=debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(hint) = e
            .downcast_ref::<EdgeError>()
            .and_then(|e| e.server_error())
            .and_then(|e| e.hint())
        {
            eprintln!("{} {}", "Hint:".yellow(), hint);
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;
    let target = describe(&config);
    if cli.verbose {
        println!("{} {}", "Connecting to:".dimmed(), target);
    }

    let started = Instant::now();
    let conn = EdgeConnection::connect(&config).await?;
    let elapsed = started.elapsed();

    let version = conn
        .protocol_version()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "{} {} {}",
        "✓".green(),
        target.cyan(),
        format!("(protocol {}, {:?})", version, elapsed).dimmed()
    );

    conn.close().await?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<EdgeConfig> {
    let credentials_path = match (&cli.instance, &cli.credentials_file) {
        (Some(name), _) => Some(
            Credentials::instance_file(name).context("cannot locate the config directory")?,
        ),
        (None, Some(path)) => Some(path.clone()),
        (None, None) => None,
    };

    let mut config = match credentials_path {
        Some(path) => EdgeConfig::from_credentials(&Credentials::from_file(&path)?),
        None => EdgeConfig::new(
            &cli.host,
            cli.port,
            &cli.user,
            cli.database.as_deref().unwrap_or(&cli.user),
        ),
    };

    if let Some(password) = &cli.password {
        config = config.password(password);
    }
    if let Some(path) = &cli.unix_path {
        config = config.unix_socket(path);
    }
    if cli.tls || cli.tls_ca_file.is_some() {
        let mut tls = config.tls.take().unwrap_or_else(TlsConfig::new);
        if let Some(path) = &cli.tls_ca_file {
            let pem = std::fs::read(path)
                .with_context(|| format!("cannot read CA file {}", path.display()))?;
            tls = tls.ca_pem(pem);
        }
        config = config.tls(tls);
    }

    Ok(config.connect_timeout(Duration::from_secs(cli.timeout)))
}

fn describe(config: &EdgeConfig) -> String {
    let place = match &config.unix_socket {
        Some(path) => path.display().to_string(),
        None => format!("{}:{}", config.host, config.port),
    };
    format!("{}@{}/{}", config.user, place, config.database)
}
