//! Command line interface

use clap::Parser;
use std::path::PathBuf;

/// Multi-agent conversation dispatcher for customer support
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "SWITCHBOARD_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "SWITCHBOARD_PORT")]
    pub port: Option<u16>,

    /// External tool server URL
    #[arg(long, env = "SWITCHBOARD_MCP_URL")]
    pub mcp_url: Option<String>,
}
