use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Verify the chat flow end to end in a real browser.
///
/// With no arguments the fixed scenario runs against http://localhost:3000/ and the
/// screenshots land in jules-scratch/verification/.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Entry page of the chat application
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Directory receiving the screenshots
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Chrome/Chromium executable
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Attach to a running browser's DevTools websocket instead of launching one
    #[arg(long, value_name = "WS_URL")]
    pub ws_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Human,
    Json,
}
