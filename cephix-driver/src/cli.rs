//! Command-line argument parsing.

use clap::Parser;

/// Cephix CSI driver daemon
#[derive(Parser, Debug)]
#[command(name = "cephix-driver")]
#[command(about = "Cephix CSI driver - Ceph storage provisioning for container orchestrators")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/cephix/driver.yaml")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON (for log aggregation)
    #[arg(long)]
    pub log_json: bool,

    /// CSI endpoint to listen on (unix:///csi/csi.sock or host:port)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Path to the cluster configuration file
    #[arg(long)]
    pub cluster_config: Option<String>,

    /// Node ID reported by NodeGetInfo (usually the host name)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Run against an in-memory mock cluster (development only)
    #[arg(long)]
    pub dev: bool,
}
