//! The compile pipeline
//!
//! ```text
//! classify ─┬─ reject ──────────────────────────────▶ passthrough
//!           └─ preprocess ─┬─ fail ──────────────────▶ exit code
//!                          └─ hash ─┬─ lookup ─┬─ hit ▶ materialize, 0
//!                                   │          └─ miss ┐
//!                                   └─ skip ───────────┴▶ compile ─┬─ fail ▶ exit code
//!                                                                  └─ ok ──▶ store, 0
//! ```
//!
//! Only the compiler's own failures reach the exit code. Store trouble of
//! any kind is a miss on the way in and a diagnostic on the way out.

use crate::config::Config;
use crate::diagnostics::{DiagnosticSink, Outcome, Report};
use crate::dispatch::StoreDispatcher;
use crate::process;
use sccache_compiler::{Fingerprint, Invocation, classify};
use sccache_store::{BlobStore, StoreStatus};
use sccache_timing::Timer;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one wrapped compiler command through the cache.
pub struct Orchestrator {
    store: Arc<dyn BlobStore>,
    sink: DiagnosticSink,
    dispatcher: StoreDispatcher,
    recache: bool,
}

impl Orchestrator {
    /// Orchestrator caching into `store` and reporting to `sink`, uploading
    /// from tasks of this process.
    #[must_use]
    pub fn new(config: &Config, store: Arc<dyn BlobStore>, sink: DiagnosticSink) -> Self {
        let dispatcher = StoreDispatcher::in_process(Arc::clone(&store), sink.clone());
        Self::with_dispatcher(config, store, sink, dispatcher)
    }

    /// Orchestrator looking up in `store` and uploading through `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(
        config: &Config,
        store: Arc<dyn BlobStore>,
        sink: DiagnosticSink,
        dispatcher: StoreDispatcher,
    ) -> Self {
        Self {
            dispatcher,
            store,
            sink,
            recache: config.recache,
        }
    }

    /// Run `command` and return the exit code to report.
    pub async fn run(&mut self, command: &[OsString]) -> i32 {
        let mut timer = Timer::new();
        let Some(program) = command.first() else {
            self.emit(&Report::new(Outcome::NoCommand, &mut timer));
            return 0;
        };

        timer.start("args");
        let invocation = match classify(command) {
            Ok(invocation) => invocation,
            Err(reason) => {
                debug!(%reason, "Command is not cacheable");
                let program = program.to_string_lossy().into_owned();
                return self.passthrough(command, program, &mut timer).await;
            }
        };

        timer.start("pp");
        let preprocessed = match process::preprocess(&invocation).await {
            Ok(output) if output.status.success() => output.stdout,
            Ok(output) => {
                self.emit(&Report::new(Outcome::PreprocessorFailed, &mut timer));
                return process::exit_code(output.status);
            }
            Err(e) => {
                warn!(error = %e, "Could not run the preprocessor");
                self.emit(&Report::new(Outcome::PreprocessorFailed, &mut timer));
                return e.exit_code();
            }
        };

        timer.start("hash");
        let key = match Fingerprint::derive(invocation.program(), invocation.args(), &preprocessed)
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Could not fingerprint the compilation, not caching");
                None
            }
        };

        let mut status = None;
        if let Some(key) = key.as_ref().filter(|_| self.should_look_up(&preprocessed)) {
            let (hit, observed) = self.look_up(&invocation, key, &mut timer).await;
            if hit {
                return 0;
            }
            status = Some(observed);
        }

        self.compile(&invocation, &preprocessed, key, status, &mut timer)
            .await
    }

    /// Wait for in-process stores started by [`Orchestrator::run`]. Detached
    /// store workers are never waited for.
    pub async fn finish(&mut self) {
        self.dispatcher.drain().await;
    }

    fn emit(&self, report: &Report) {
        self.sink.emit(report);
    }

    fn should_look_up(&self, preprocessed: &[u8]) -> bool {
        if self.recache {
            debug!("Recache requested, skipping lookup");
            return false;
        }
        if preprocessed.is_empty() {
            debug!("Empty preprocessed output, skipping lookup");
            return false;
        }
        true
    }

    async fn passthrough(&self, command: &[OsString], program: String, timer: &mut Timer) -> i32 {
        let report = Report::new(Outcome::Passthrough { program }, timer);
        let code = match process::passthrough(command).await {
            Ok(status) => process::exit_code(status),
            Err(e) => {
                warn!(error = %e, "Could not run the command");
                e.exit_code()
            }
        };
        self.emit(&report);
        code
    }

    /// Look `key` up and materialize a hit. Returns whether the output was
    /// written, plus the store status the lookup left behind.
    async fn look_up(
        &self,
        invocation: &Invocation,
        key: &Fingerprint,
        timer: &mut Timer,
    ) -> (bool, StoreStatus) {
        let found = self.store.get(key.as_str(), timer.start_group("get")).await;
        let status = self.store.status();
        let Some(object) = found else {
            debug!(%key, store = %status.name, status = status.code, "Cache miss");
            return (false, status);
        };

        timer.start("unz");
        match object.write_to(Path::new(invocation.output())) {
            Ok(written) => {
                info!(%key, output = invocation.output(), written, "Cache hit");
                let report = Report::new(
                    Outcome::CacheHit {
                        key: key.clone(),
                        output: invocation.output().to_string(),
                    },
                    timer,
                )
                .with_bytes(object.len());
                self.emit(&report);
                (true, status)
            }
            Err(e) => {
                warn!(%key, error = %e, "Could not use cached object, compiling");
                (false, status)
            }
        }
    }

    async fn compile(
        &mut self,
        invocation: &Invocation,
        preprocessed: &[u8],
        key: Option<Fingerprint>,
        status: Option<StoreStatus>,
        timer: &mut Timer,
    ) -> i32 {
        let output = invocation.output().to_string();
        timer.start("comp");
        let code = match process::compile(invocation, preprocessed).await {
            Ok(exit) if !exit.success() => process::exit_code(exit),
            Ok(_) if !Path::new(&output).exists() => {
                warn!(%output, "Compiler succeeded without writing its output");
                1
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(error = %e, "Could not run the compiler");
                e.exit_code()
            }
        };
        if code != 0 {
            let report = Report::new(Outcome::CompilationFailed { output }, timer)
                .with_status(status);
            self.emit(&report);
            return code;
        }

        let Some(key) = key else {
            self.emit(&Report::new(Outcome::Compiled { output }, timer));
            return 0;
        };

        timer.start("spawn");
        self.dispatcher.dispatch(&output, key.clone(), timer).await;
        let report = Report::new(Outcome::Caching { output, key }, timer).with_status(status);
        self.emit(&report);
        0
    }
}
