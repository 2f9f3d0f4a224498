//! Detached store worker
//!
//! The binary re-executed with [`WORKER_ENV`](crate::dispatch::WORKER_ENV)
//! set reads one [`StoreJob`] from stdin, acknowledges on stdout once the
//! object is in memory, then uploads it and writes the `Cached` or
//! `Failure caching` line. The compile that started it has usually exited by
//! then.

use crate::config::Config;
use crate::diagnostics::DiagnosticSink;
use crate::dispatch::{StoreJob, upload};
use crate::error::{Error, Result};
use sccache_compiler::Fingerprint;
use sccache_store::HttpBlobStore;
use std::io::Write;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

/// Run one store job read from stdin. Returns the worker's exit code.
pub async fn run(config: &Config, sink: DiagnosticSink) -> i32 {
    let (job, key) = match read_job().await {
        Ok(job) => job,
        Err(e) => {
            error!(error = %e, "Store worker received no usable job");
            return 1;
        }
    };
    debug!(%key, output = %job.output, "Store worker started");

    let store = HttpBlobStore::from_config(config.store.clone());
    upload(&store, &sink, job.output, key, job.timer, acknowledge).await;
    0
}

async fn read_job() -> Result<(StoreJob, Fingerprint)> {
    let mut payload = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut payload)
        .await
        .map_err(|e| Error::io(e, "read store job"))?;
    let job: StoreJob =
        serde_json::from_slice(&payload).map_err(|e| Error::worker(e.to_string()))?;
    let key = job
        .key
        .parse::<Fingerprint>()
        .map_err(|e| Error::worker(e.to_string()))?;
    Ok((job, key))
}

fn acknowledge() {
    let mut stdout = std::io::stdout();
    if let Err(e) = stdout.write_all(b".").and_then(|()| stdout.flush()) {
        debug!(error = %e, "Parent stopped listening for the acknowledgement");
    }
}
