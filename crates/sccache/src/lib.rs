//! sccache: a transparent compiler cache
//!
//! The `sccache` binary is put in front of a compiler (`sccache cc -c a.c -o
//! a.o`). Cacheable single-file compilations are preprocessed, fingerprinted
//! and looked up in a remote blob store; a hit writes the stored object and
//! skips code generation, a miss compiles from the preprocessed source and
//! uploads the result in the background. Anything else runs unmodified.
//!
//! Every run ends with one `sccache: ...` diagnostic line carrying the phase
//! timings, see [`diagnostics`].

pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod worker;

pub use config::Config;
pub use diagnostics::{DiagnosticSink, Outcome, Report};
pub use dispatch::{StoreDispatcher, WORKER_ENV};
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;

use sccache_store::{BlobStore, HttpBlobStore};
use std::ffi::OsString;
use std::sync::Arc;
use tracing::warn;

/// Run one wrapped compiler command and return its exit code.
///
/// Uploads run in detached copies of the current executable and may still be
/// in flight when this returns. If the executable cannot be located they run
/// in-process instead and are awaited here; the exit code never depends on
/// them either way.
pub async fn run(config: Config, sink: DiagnosticSink, command: Vec<OsString>) -> i32 {
    let store: Arc<dyn BlobStore> = Arc::new(HttpBlobStore::from_config(config.store.clone()));
    let dispatcher = match std::env::current_exe() {
        Ok(program) => StoreDispatcher::worker(program, sink.clone()),
        Err(e) => {
            warn!(error = %e, "Cannot locate own executable, storing in-process");
            StoreDispatcher::in_process(Arc::clone(&store), sink.clone())
        }
    };
    let mut orchestrator = Orchestrator::with_dispatcher(&config, store, sink, dispatcher);
    let code = orchestrator.run(&command).await;
    orchestrator.finish().await;
    code
}
