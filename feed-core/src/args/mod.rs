//! Defines the command-line arguments shared by every process.
//!
//! This module uses `clap` to parse the parameters common to the receiver and
//! the log saver. Everything else lives in the JSON configuration file, so
//! both processes are configured from one place.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Holds the standard parameters parsed from the command line.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct CommonArgs {
    /// Name of the process (used in log lines)
    #[arg(short, long, default_value = "krx_feed")]
    service_name: String,

    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "./config/feed.json")]
    config: PathBuf,
}

impl CommonArgs {
    /// Parses command-line arguments into a `CommonArgs` struct.
    ///
    /// This function automatically handles `--help` and `--version` flags via `clap`.
    /// If arguments are invalid, it will print an error and exit.
    pub fn parse_args(args: Vec<String>) -> Self {
        CommonArgs::parse_from(args)
    }

    /// Returns the path of the configuration file.
    pub fn get_config_path(&self) -> PathBuf {
        self.config.clone()
    }

    /// Returns the name of the service.
    pub fn get_service_name(&self) -> String {
        self.service_name.clone()
    }
}
