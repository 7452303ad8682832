use std::path::PathBuf;

use tally_core::StatsError;
use tally_github::RemoteError;
use thiserror::Error;

pub mod charts;
pub mod cli;
pub mod outputs;
pub mod publish;
pub mod run;

pub use charts::{ChartPublishResult, ChartTarget, build_chart_targets, publish_charts};
pub use publish::{PublishOutcome, TotalSource, commit_message, publish_document};
pub use run::{RunReport, run_publish};

/// Attempts allowed for each read-merge-write cycle before a conflict is fatal.
pub const MAX_WRITE_ATTEMPTS: u32 = 4;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("failed to serialize downloads document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("concurrent writes to '{path}' kept conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        path: String,
        attempts: u32,
        #[source]
        source: RemoteError,
    },
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
