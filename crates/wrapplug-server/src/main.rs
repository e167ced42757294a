//! Reference wrapplug plugin.
//!
//! Serves an XChaCha20-Poly1305 wrapper under a root key supplied on the
//! command line or in the environment. Meant to be launched by a host, which
//! sets the handshake cookie and its client certificate.
//!
//! # Usage
//!
//! ```bash
//! WRAPPLUG_AEAD_KEY=$(openssl rand -hex 32) wrapplug-plugin --key-id root
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wrapplug_core::AeadWrapper;
use wrapplug_server::{PluginOptions, serve_plugin};

/// wrapplug reference plugin
#[derive(Parser, Debug)]
#[command(name = "wrapplug-plugin")]
#[command(about = "AEAD key-wrapping plugin for wrapplug hosts")]
#[command(version)]
struct Args {
    /// Key id reported for the root key
    #[arg(long, default_value = "root")]
    key_id: String,

    /// Root key, 32 bytes hex encoded
    #[arg(long, env = "WRAPPLUG_AEAD_KEY", hide_env_values = true)]
    key_hex: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout is reserved for the handshake line
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let key = hex::decode(args.key_hex.trim())?;
    let wrapper = AeadWrapper::new(args.key_id, &key)?;

    serve_plugin(Some(Arc::new(wrapper)), PluginOptions::default()).await?;

    tracing::info!("plugin stopped");
    Ok(())
}
