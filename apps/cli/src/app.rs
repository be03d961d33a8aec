//! Runs one upload from parsed arguments and configuration.

use std::sync::Arc;

use ossup_local_store::LocalStore;
use ossup_transfer::CheckpointStore;
use ossup_upload::{UploadOutput, UploadRequest, Uploader};

use crate::args::Args;
use crate::config::Config;

/// Uploads `args.file` into the bucket directory and returns the result.
pub async fn run(args: &Args, config: &Config) -> anyhow::Result<UploadOutput> {
    let store = LocalStore::new(&args.bucket);
    let uploader = Uploader::new(
        Arc::new(store),
        CheckpointStore::new(&config.checkpoint_dir),
    );

    let request = UploadRequest {
        source_path: args.file.clone(),
        prefix: args.prefix.clone(),
        keep_original_name: args.keep_name,
        options: config.upload_options(),
    };

    let progress = |percent: u8| tracing::info!(progress = percent, "upload progress");
    let output = uploader.upload(&request, &progress).await?;
    Ok(output)
}
