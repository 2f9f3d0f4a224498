//! Running the wrapped compiler
//!
//! The compiler's stderr is always inherited so warnings and errors reach
//! the user unchanged. Only preprocessed output is captured.

use crate::error::{Error, Result};
use sccache_compiler::Invocation;
use std::ffi::OsString;
use std::io;
use std::process::{ExitStatus, Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

/// Exit code for a finished child; signals count as a plain failure.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Run `command` exactly as given, with all streams inherited.
pub async fn passthrough(command: &[OsString]) -> Result<ExitStatus> {
    let Some((program, args)) = command.split_first() else {
        return Err(Error::spawn(
            "",
            io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        ));
    };
    debug!(program = %program.to_string_lossy(), "Running command unmodified");
    Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| Error::spawn(program, e))
}

/// Blocking variant of [`passthrough`] for when no runtime is available.
#[must_use]
pub fn passthrough_blocking(command: &[OsString]) -> i32 {
    let Some((program, args)) = command.split_first() else {
        return 0;
    };
    match std::process::Command::new(program).args(args).status() {
        Ok(status) => exit_code(status),
        Err(e) => Error::spawn(program, e).exit_code(),
    }
}

/// Preprocess the single input; stdout holds the preprocessed source.
pub async fn preprocess(invocation: &Invocation) -> Result<Output> {
    let args = invocation.preprocess_args();
    trace!(program = %invocation.program().display(), ?args, "Preprocessing");
    Command::new(invocation.program())
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| Error::spawn(invocation.program(), e))
}

/// Compile `preprocessed`, fed through stdin, into the invocation's output.
pub async fn compile(invocation: &Invocation, preprocessed: &[u8]) -> Result<ExitStatus> {
    let args = invocation.compile_args();
    trace!(program = %invocation.program().display(), ?args, "Compiling");
    let mut child = Command::new(invocation.program())
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| Error::spawn(invocation.program(), e))?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(preprocessed).await {
            // The compiler may stop reading early; its exit status says why.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Compiler closed stdin before reading all input");
            }
            result => result.map_err(|e| Error::io(e, "write compiler stdin"))?,
        }
    }

    child
        .wait()
        .await
        .map_err(|e| Error::io(e, "wait for compiler"))
}
