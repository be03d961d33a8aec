//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ossup", version, about = "Resumable multipart upload into a bucket")]
pub struct Args {
    /// Local file to upload.
    pub file: PathBuf,

    /// Bucket directory that receives the object.
    #[arg(long)]
    pub bucket: PathBuf,

    /// Path to TOML configuration file.
    /// Defaults to ~/.config/ossup/config.toml when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Destination prefix ("folder") inside the bucket.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Keep the file name as is instead of prefixing a timestamp.
    #[arg(long)]
    pub keep_name: bool,

    /// Whole-operation retries (0-5).
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Disable checkpoints; failed multipart sessions are aborted.
    #[arg(long)]
    pub no_resume: bool,

    /// Multipart chunk size in bytes (minimum 100 KiB).
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Directory for resume checkpoints.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
}
