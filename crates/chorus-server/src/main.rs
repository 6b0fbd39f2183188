//! Chorus server binary.
//!
//! # Usage
//!
//! ```bash
//! # Request router
//! chorus-server broker --frontend 0.0.0.0:5555 --backend 0.0.0.0:5556
//!
//! # Broadcast fan-out
//! chorus-server proxy --frontend 0.0.0.0:5557 --backend 0.0.0.0:5558
//!
//! # Rank and liveness registry
//! chorus-server reference --bind 0.0.0.0:5559 --timeout-secs 30
//! ```

use std::time::Duration;

use chorus_server::{
    Broker, BrokerConfig, Proxy, ProxyConfig, ReferenceConfig, ReferenceService,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chorus coordination services
#[derive(Parser, Debug)]
#[command(name = "chorus-server")]
#[command(about = "Request broker, broadcast proxy and reference server for Chorus")]
#[command(version)]
struct Args {
    /// Service to run
    #[command(subcommand)]
    service: Service,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Service {
    /// Route requests from clients to workers and replies back
    Broker {
        /// Address request clients connect to
        #[arg(long, default_value = "0.0.0.0:5555")]
        frontend: String,

        /// Address workers connect to
        #[arg(long, default_value = "0.0.0.0:5556")]
        backend: String,

        /// Requests queued while no worker is connected
        #[arg(long, default_value = "1024")]
        max_pending: usize,
    },

    /// Fan publications out to topic subscribers
    Proxy {
        /// Address publishers connect to
        #[arg(long, default_value = "0.0.0.0:5557")]
        frontend: String,

        /// Address subscribers connect to
        #[arg(long, default_value = "0.0.0.0:5558")]
        backend: String,

        /// Publications buffered for slow subscribers
        #[arg(long, default_value = "1024")]
        buffer: usize,
    },

    /// Assign ranks and track server liveness
    Reference {
        /// Request/reply address
        #[arg(long, default_value = "0.0.0.0:5559")]
        bind: String,

        /// Seconds between liveness sweeps
        #[arg(long, default_value = "10")]
        sweep_interval_secs: u64,

        /// Seconds of silence before a server is evicted
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.service {
        Service::Broker { frontend, backend, max_pending } => {
            let config =
                BrokerConfig { frontend, backend, max_pending, ..BrokerConfig::default() };
            let broker = Broker::bind(config).await?;
            tracing::info!("Broker listening on {}", broker.frontend_addr()?);
            broker.run().await?;
        },
        Service::Proxy { frontend, backend, buffer } => {
            let proxy = Proxy::bind(ProxyConfig { frontend, backend, buffer }).await?;
            tracing::info!("Proxy listening on {}", proxy.frontend_addr()?);
            proxy.run().await?;
        },
        Service::Reference { bind, sweep_interval_secs, timeout_secs } => {
            let config = ReferenceConfig {
                bind,
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                timeout: Duration::from_secs(timeout_secs),
            };
            let service = ReferenceService::bind(config).await?;
            tracing::info!("Reference server listening on {}", service.local_addr()?);
            service.run().await?;
        },
    }

    Ok(())
}
