mod auth;
mod breakpoints;
mod cache;
mod config;
mod controller;
mod error;
mod pipelines;
mod processor;
mod response;
mod routes;
mod storage;
mod upload;
mod utils;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::controller::Controller;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(name = "breakpoint", version, about = "A responsive image server.")]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the server with the given configuration.
    Run {
        /// The path to a YAML config file.
        #[clap(short, long, env = "BREAKPOINT_CONFIG", default_value = "config.yaml")]
        config: PathBuf,

        /// Overrides the configured bind host.
        #[clap(long, env = "BREAKPOINT_HOST")]
        host: Option<String>,

        /// Overrides the configured bind port.
        #[clap(long, env = "BREAKPOINT_PORT")]
        port: Option<u16>,

        /// Disables upload token expiry checks. Do not use in production.
        #[clap(long)]
        debug: bool,

        /// Base64 encoded 32 byte key used to open upload tokens.
        #[clap(long, env = "BREAKPOINT_UPLOAD_KEY", hide_env_values = true)]
        upload_key: Option<String>,
    },

    /// Writes a template configuration file.
    Init {
        #[clap(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match args.command {
        Commands::Init { output } => run_init(output).await,
        Commands::Run {
            config,
            host,
            port,
            debug,
            upload_key,
        } => {
            let mut cfg = RuntimeConfig::from_file(&config)?;
            apply_overrides(&mut cfg, host, port, debug, upload_key);
            run_server(cfg).await
        },
    }
}

fn apply_overrides(
    cfg: &mut RuntimeConfig,
    host: Option<String>,
    port: Option<u16>,
    debug: bool,
    upload_key: Option<String>,
) {
    if let Some(host) = host {
        cfg.host = host;
    }

    if let Some(port) = port {
        cfg.port = port;
    }

    if debug {
        cfg.debug = true;
    }

    if upload_key.is_some() {
        cfg.auth.key = upload_key;
    }
}

async fn run_init(output: PathBuf) -> anyhow::Result<()> {
    let template = RuntimeConfig::template()?;
    tokio::fs::write(&output, template)
        .await
        .with_context(|| format!("failed to write config template to {:?}", &output))?;

    info!("Wrote config template to {:?}", &output);
    Ok(())
}

async fn run_server(cfg: RuntimeConfig) -> anyhow::Result<()> {
    if cfg.debug {
        warn!(
            "Debug mode is enabled, upload token expiry is not checked. \
             DO NOT USE IN PRODUCTION."
        );
    }

    let addr: SocketAddr = format!("{}:{}", &cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;

    let controller = Controller::from_config(&cfg).await?;
    let app = routes::router(Arc::new(controller));

    info!("Serving images on http://{}", addr);
    Server::new(TcpListener::bind(addr)).run(app).await?;

    Ok(())
}
