//! # Cephix CSI Driver
//!
//! The driver daemon runs next to a Ceph cluster and provisions CephFS
//! subvolumes, RBD images and NFS re-exports for a container orchestrator
//! over the CSI gRPC contract.
//!
//! ## Usage
//! ```bash
//! cephix-driver --config /etc/cephix/driver.yaml \
//!     --endpoint unix:///csi/csi.sock
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cephix_driver::cli::Args;
use cephix_driver::config::Config;
use cephix_driver::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    if args.log_json {
        cephix_common::init_logging_json(&args.log_level)?;
    } else {
        cephix_common::init_logging(&args.log_level)?;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Cephix CSI driver"
    );

    // Load configuration
    let config = match Config::load(&args.config) {
        Ok(cfg) => {
            info!(config_path = %args.config, "Configuration loaded");
            cfg
        }
        Err(_) if args.config == "/etc/cephix/driver.yaml" => {
            info!("No config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            error!(error = %e, path = %args.config, "Failed to load configuration");
            return Err(e);
        }
    };

    // Override config with CLI args
    let config = config.with_cli_overrides(&args);

    info!(
        endpoint = %config.server.endpoint,
        driver = %config.driver.name,
        "Driver configured"
    );

    // Start gRPC server
    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
