//! Storage client and its download pipeline.

mod download;
mod download_outcome;
mod storage_client;
mod storage_config;

pub use download_outcome::{DownloadOutcome, SkipReason};
pub use storage_client::StorageClient;
pub use storage_config::{DEFAULT_DOWNLOAD_RATE, StorageClientConfig};
