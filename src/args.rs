use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "report_pull")]
#[command(about = "Export a Smartsheet report as a spreadsheet and email the admin on failure")]
#[command(version)]
pub struct Args {
    /// Full output path (directory, file name and extension); overrides TARGET_DIR/SMARTSHEET_NAME
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Print the resolved save path before exporting
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Dotenv file loaded into the environment before reading configuration
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Path to config file
    #[arg(long, default_value = "config/config.toml")]
    pub config: String,
}
