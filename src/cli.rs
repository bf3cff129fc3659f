//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "otpmig")]
#[command(about = "Authenticator migration toolkit", long_about = None)]
pub struct Cli {
    /// Migration link (otpauth-migration://offline?data=...)
    #[arg(long, conflicts_with = "file")]
    pub link: Option<String>,

    /// Print current codes instead of otpauth URIs
    #[arg(long, requires = "link")]
    pub eval: bool,

    /// Also write a QR code PNG for every printed URI
    #[arg(long, requires = "link")]
    pub qr: bool,

    /// Serve the live OTP feed for the link on this address
    #[arg(long, value_name = "ADDR", requires = "link")]
    pub http: Option<String>,

    /// File of otpauth:// URIs, one per line, to pack into migration batches
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Credentials per migration batch
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Output directory for generated PNG files
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// File name prefix for batch QR codes
    #[arg(long, default_value = "batch")]
    pub prefix: String,

    /// Reject HOTP entries without a counter
    #[arg(long)]
    pub strict: bool,

    /// Live server config (JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
