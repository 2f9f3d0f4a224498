//! `sccache <compiler> <args...>`

use sccache::{Config, DiagnosticSink, WORKER_ENV, logging, process, worker};
use std::ffi::OsString;

fn main() {
    logging::init();

    // Claim the diagnostics descriptor before the runtime opens anything that
    // could reuse its number.
    let config = Config::from_env();
    let sink = DiagnosticSink::open(config.diagnostics_fd);

    let command: Vec<OsString> = std::env::args_os().skip(1).collect();
    let store_worker = std::env::var_os(WORKER_ENV).is_some();
    let exit_code = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) if store_worker => rt.block_on(worker::run(&config, sink)),
        Ok(rt) => rt.block_on(sccache::run(config, sink, command)),
        Err(e) if store_worker => {
            tracing::error!(error = %e, "Failed to create tokio runtime for the store worker");
            1
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create tokio runtime, running command uncached");
            process::passthrough_blocking(&command)
        }
    };
    std::process::exit(exit_code);
}
