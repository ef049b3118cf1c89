pub mod env;
pub mod toml_config;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "entrypoint")]
#[command(about = "Container entrypoint: waits for services, then runs a builtin command")]
pub struct CliConfig {
    /// Optional TOML file with entrypoint settings and default overrides
    #[arg(long, env = "ENTRYPOINT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, env = "ENTRYPOINT_VERBOSE", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, env = "ENTRYPOINT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Builtin command, or any command line to exec
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliConfig {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
