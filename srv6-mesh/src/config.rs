use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ipnet::Ipv6Net;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    /// Run the node agent
    Agent(AgentArgs),
    /// Print the CRD manifests
    Crds,
}

#[derive(Parser, Debug, Clone)]
pub struct AgentArgs {
    /// Path to the bpf fs for pinned maps
    #[arg(long, default_value = "/sys/fs/bpf")]
    pub bpf_fs: PathBuf,

    /// Metrics and readiness listener
    #[arg(long, default_value = "0.0.0.0:9960")]
    pub metrics_address: SocketAddr,

    /// Name of the node the agent is running on
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Prefix the default SID allocator hands addresses from
    #[arg(long, env = "SID_PREFIX", default_value = "fd00:0:1:1::/64")]
    pub sid_prefix: Ipv6Net,

    /// Program SRv6 egress state. When disabled, inputs are still accepted
    /// but no datapath map is written.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_srv6: bool,
}
