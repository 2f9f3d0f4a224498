//! Background object upload
//!
//! A successful compile hands its output to a store worker and only waits
//! for the worker to confirm it has read the object. The worker uploads on
//! its own copy of the timer and reports through its own diagnostic line, so
//! the caller's exit code is settled, and the caller may exit, before the
//! upload finishes.
//!
//! The binary re-executes itself as a detached worker process (see
//! [`WORKER_ENV`]) that outlives the compile. The in-process variant runs the
//! same upload on a tokio task and is only complete once drained.

use crate::diagnostics::{DiagnosticSink, Outcome, Report};
use crate::error::{Error, Result};
use sccache_compiler::Fingerprint;
use sccache_store::{BlobStore, CachedObject};
use sccache_timing::Timer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Set on a re-executed binary to make it a store worker.
pub const WORKER_ENV: &str = "SCCACHE_STORE_WORKER";

/// Everything a store worker needs, sent as JSON on its stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreJob {
    /// Compiled object to upload
    pub output: String,
    /// Store key, as rendered by [`Fingerprint`]
    pub key: String,
    /// Phases recorded by the compile up to the hand-off
    pub timer: Timer,
}

enum Mode {
    Worker {
        program: PathBuf,
        sink: DiagnosticSink,
    },
    Task {
        store: Arc<dyn BlobStore>,
        sink: DiagnosticSink,
        pending: Vec<JoinHandle<()>>,
    },
}

/// Hands compiled objects to background store workers.
pub struct StoreDispatcher {
    mode: Mode,
}

impl StoreDispatcher {
    /// Upload from detached `program` processes running in worker mode.
    ///
    /// `sink` only receives the failure line when no worker could be started;
    /// workers open their own.
    #[must_use]
    pub fn worker(program: impl Into<PathBuf>, sink: DiagnosticSink) -> Self {
        Self {
            mode: Mode::Worker {
                program: program.into(),
                sink,
            },
        }
    }

    /// Upload to `store` from tokio tasks of this process.
    #[must_use]
    pub fn in_process(store: Arc<dyn BlobStore>, sink: DiagnosticSink) -> Self {
        Self {
            mode: Mode::Task {
                store,
                sink,
                pending: Vec::new(),
            },
        }
    }

    /// Upload the object at `output` under `key` in the background.
    ///
    /// Returns once the worker owns the object's bytes. `timer` is copied so
    /// the worker's report carries the phases that led up to the upload.
    pub async fn dispatch(&mut self, output: &str, key: Fingerprint, timer: &Timer) {
        let mut timer = timer.clone();
        match &mut self.mode {
            Mode::Worker { program, sink } => {
                timer.stop();
                let job = StoreJob {
                    output: output.to_string(),
                    key: key.to_string(),
                    timer,
                };
                if let Err(e) = spawn_worker(program, &job).await {
                    warn!(error = %e, "Could not start store worker");
                    let mut timer = job.timer;
                    let outcome = Outcome::CacheFailure {
                        output: job.output,
                        key,
                    };
                    sink.emit(&Report::new(outcome, &mut timer));
                }
            }
            Mode::Task {
                store,
                sink,
                pending,
            } => {
                let (ack, acked) = oneshot::channel();
                let store = Arc::clone(store);
                let sink = sink.clone();
                let output = output.to_string();
                let handle = tokio::spawn(async move {
                    let ack = move || {
                        let _ = ack.send(());
                    };
                    upload(store.as_ref(), &sink, output, key, timer, ack).await;
                });
                if acked.await.is_err() {
                    debug!("Store task ended before taking the object");
                }
                pending.push(handle);
            }
        }
    }

    /// Number of in-process store tasks not yet drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        match &self.mode {
            Mode::Worker { .. } => 0,
            Mode::Task { pending, .. } => pending.len(),
        }
    }

    /// Wait for every in-process store task. Worker processes are never
    /// waited for.
    pub async fn drain(&mut self) {
        if let Mode::Task { pending, .. } = &mut self.mode {
            for handle in pending.drain(..) {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Store task did not complete");
                }
            }
        }
    }
}

/// Read the object, acknowledge, upload, and report the outcome.
pub(crate) async fn upload(
    store: &dyn BlobStore,
    sink: &DiagnosticSink,
    output: String,
    key: Fingerprint,
    mut timer: Timer,
    ack: impl FnOnce(),
) {
    let read = tokio::fs::read(Path::new(&output)).await;
    ack();

    let outcome = match read {
        Ok(bytes) => {
            let object = CachedObject::Object(bytes);
            match store.put(key.as_str(), &object, timer.start_group("put")).await {
                Ok(()) => {
                    debug!(%key, %output, "Stored object");
                    Ok(Outcome::Cached { output, key })
                }
                Err(e) => {
                    let status = store.status();
                    warn!(
                        %key,
                        %output,
                        store = %status.name,
                        status = status.code,
                        error = %e,
                        "Failed to store object"
                    );
                    Err(Outcome::CacheFailure { output, key })
                }
            }
        }
        Err(e) => {
            warn!(%output, error = %e, "Failed to read compiled object");
            Err(Outcome::CacheFailure { output, key })
        }
    };

    let report = match outcome {
        Ok(outcome) => Report::new(outcome, &mut timer),
        Err(outcome) => Report::new(outcome, &mut timer).with_status(Some(store.status())),
    };
    sink.emit(&report);
}

/// Start `program` as a worker in its own session, send it `job` and wait
/// for its one-byte acknowledgement. The worker is left running.
async fn spawn_worker(program: &Path, job: &StoreJob) -> Result<()> {
    let payload = serde_json::to_vec(job).map_err(|e| Error::worker(e.to_string()))?;

    let mut command = Command::new(program);
    command
        .env(WORKER_ENV, "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    detach(&mut command);
    let mut child = command.spawn().map_err(|e| Error::spawn(program, e))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::worker("stdin was not captured"))?;
    stdin
        .write_all(&payload)
        .await
        .map_err(|e| Error::io(e, "send store job"))?;
    drop(stdin);

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::worker("stdout was not captured"))?;
    let mut ack = [0u8; 1];
    if let Err(e) = stdout.read_exact(&mut ack).await {
        // The worker reports its own failure.
        debug!(error = %e, "Store worker exited before acknowledging");
    }
    debug!(pid = ?child.id(), "Store worker detached");
    Ok(())
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn detach(command: &mut Command) {
    // SAFETY: setsid is async-signal-safe and touches no state shared with
    // the parent.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sccache_compiler::ProgramIdentity;
    use sccache_store::MemoryBlobStore;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn key() -> Fingerprint {
        let identity = ProgramIdentity {
            path: "/usr/bin/cc".into(),
            size: 10,
            modified: Duration::from_secs(1),
        };
        Fingerprint::compute(&identity, &["-c".to_string()], b"int main;")
    }

    #[tokio::test]
    async fn test_dispatch_stores_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.o");
        std::fs::write(&output, b"object").unwrap();
        let output = output.to_string_lossy().into_owned();

        let store = Arc::new(MemoryBlobStore::new());
        let captured = Captured::default();
        let mut dispatcher =
            StoreDispatcher::in_process(store.clone(), DiagnosticSink::from_writer(captured.clone()));

        let mut timer = Timer::new();
        timer.start("spawn");
        dispatcher.dispatch(&output, key(), &timer).await;
        assert_eq!(dispatcher.pending(), 1);
        dispatcher.drain().await;
        assert_eq!(dispatcher.pending(), 0);

        assert!(store.contains(key().as_str()));
        let text = captured.text();
        assert!(
            text.starts_with(&format!("sccache: Cached {output} as {}", key())),
            "{text}"
        );
        assert!(text.contains("put: "), "{text}");
    }

    #[tokio::test]
    async fn test_dispatch_reports_store_failure_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.o");
        std::fs::write(&output, b"object").unwrap();
        let output = output.to_string_lossy().into_owned();

        let captured = Captured::default();
        let mut dispatcher = StoreDispatcher::in_process(
            Arc::new(MemoryBlobStore::rejecting(403)),
            DiagnosticSink::from_writer(captured.clone()),
        );
        dispatcher.dispatch(&output, key(), &Timer::new()).await;
        dispatcher.drain().await;

        let text = captured.text();
        assert!(text.contains("Failure caching"), "{text}");
        assert!(text.trim_end().ends_with(" 403]"), "{text}");
    }

    #[tokio::test]
    async fn test_dispatch_missing_output_reports_failure() {
        let store = Arc::new(MemoryBlobStore::new());
        let captured = Captured::default();
        let mut dispatcher =
            StoreDispatcher::in_process(store.clone(), DiagnosticSink::from_writer(captured.clone()));
        dispatcher
            .dispatch("/nonexistent/a.o", key(), &Timer::new())
            .await;
        dispatcher.drain().await;

        assert_eq!(store.puts(), 0);
        assert!(captured.text().contains("Failure caching /nonexistent/a.o"));
    }

    #[tokio::test]
    async fn test_unstartable_worker_reports_failure() {
        let captured = Captured::default();
        let mut dispatcher = StoreDispatcher::worker(
            "/nonexistent/sccache",
            DiagnosticSink::from_writer(captured.clone()),
        );
        let mut timer = Timer::new();
        timer.start("spawn");
        dispatcher.dispatch("a.o", key(), &timer).await;

        assert_eq!(dispatcher.pending(), 0);
        let text = captured.text();
        assert!(
            text.starts_with(&format!("sccache: Failure caching a.o as {}", key())),
            "{text}"
        );
        assert!(text.contains("spawn: "), "{text}");
    }

    #[test]
    fn test_store_job_carries_timer_and_key() {
        let mut timer = Timer::new();
        timer.start("comp");
        timer.stop();
        let job = StoreJob {
            output: "a.o".into(),
            key: key().to_string(),
            timer,
        };

        let json = serde_json::to_string(&job).unwrap();
        let restored: StoreJob = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.key.parse::<Fingerprint>().unwrap(), key());
        assert!(restored.timer.get("comp").is_some());
    }
}
