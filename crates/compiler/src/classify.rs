//! Command line classification
//!
//! Only single-file `-c ... -o out` compilations of a recognized source kind
//! are cacheable. Everything else is rejected and runs unmodified.

use crate::kind::SourceKind;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Flags whose value is the following token.
const FLAGS_WITH_VALUE: &[&str] = &[
    "--param",
    "-A",
    "-D",
    "-F",
    "-G",
    "-I",
    "-L",
    "-MF",
    "-MQ",
    "-U",
    "-V",
    "-Xassembler",
    "-Xlinker",
    "-Xpreprocessor",
    "-aux-info",
    "-b",
    "-idirafter",
    "-iframework",
    "-imacros",
    "-imultilib",
    "-include",
    "-install_name",
    "-iprefix",
    "-iquote",
    "-isysroot",
    "-isystem",
    "-iwithprefix",
    "-iwithprefixbefore",
    "-u",
];

/// Flags that make the preprocessor emit dependency rules.
const DEPENDENCY_FLAGS: &[&str] = &["-M", "-MM", "-MD", "-MMD"];

const STDIN_INPUT: &str = "-";

/// Why a command line is not cacheable.
///
/// A rejection is not a failure: the command simply runs as given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reject {
    /// The argument vector was empty
    #[error("no program given")]
    Empty,
    /// The program is neither an existing path nor found on PATH
    #[error("program `{0}` not found")]
    ProgramNotFound(String),
    /// An argument is not valid UTF-8
    #[error("argument is not valid UTF-8")]
    NonUtf8Argument,
    /// Profile-guided builds depend on profile data outside the key
    #[error("profile-guided compilation (-fprofile-use)")]
    ProfileGuided,
    /// A flag that takes a value was the last argument
    #[error("`{0}` is missing its value")]
    MissingValue(String),
    /// No `-c`
    #[error("not a compilation (-c missing)")]
    NotCompilation,
    /// No `-o`
    #[error("no output file (-o missing)")]
    MissingOutput,
    /// Zero or several inputs
    #[error("expected exactly one input, found {0}")]
    InputCount(usize),
    /// The input is read from stdin
    #[error("input read from stdin")]
    StdinInput,
    /// The input extension is not a recognized source kind
    #[error("unrecognized source extension `{0}`")]
    UnknownSourceKind(String),
}

/// A cacheable compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    input: String,
    output: String,
    kind: SourceKind,
    args: Vec<String>,
    reduced_args: Vec<String>,
    dependency_target: Option<String>,
}

impl Invocation {
    /// Absolute path of the compiler.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The single source file.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Object file named by `-o`.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Kind of the source file.
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Arguments as given, without the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Flags that still apply when compiling preprocessed source.
    ///
    /// Excludes `-c`, `-o <out>`, `-MT <target>` and the input.
    #[must_use]
    pub fn reduced_args(&self) -> &[String] {
        &self.reduced_args
    }

    /// `-MT <target>` to pass to the preprocessor when a dependency flag was
    /// given without an explicit target. Never passed to the compile step.
    #[must_use]
    pub fn explicit_target_args(&self) -> Vec<String> {
        self.dependency_target
            .as_ref()
            .map(|target| vec!["-MT".to_string(), target.clone()])
            .unwrap_or_default()
    }

    /// Arguments for the preprocessing run.
    #[must_use]
    pub fn preprocess_args(&self) -> Vec<String> {
        let mut args = vec!["-E".to_string(), self.input.clone()];
        args.extend(self.explicit_target_args());
        args.extend(self.reduced_args.iter().cloned());
        args
    }

    /// Arguments for compiling preprocessed source read from stdin.
    #[must_use]
    pub fn compile_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            "-x".to_string(),
            self.kind.preprocessed_language().to_string(),
            STDIN_INPUT.to_string(),
            "-o".to_string(),
            self.output.clone(),
        ];
        args.extend(self.reduced_args.iter().cloned());
        args
    }
}

/// Classify a command line, resolving the program through the filesystem
/// and `PATH`.
pub fn classify(command: &[OsString]) -> Result<Invocation, Reject> {
    classify_with(command, resolve_program)
}

/// Classify a command line with a custom program lookup.
pub fn classify_with<F>(command: &[OsString], resolve: F) -> Result<Invocation, Reject>
where
    F: FnOnce(&str) -> Option<PathBuf>,
{
    let command = command
        .iter()
        .map(|arg| arg.to_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or(Reject::NonUtf8Argument)?;
    let (program, args) = command.split_first().ok_or(Reject::Empty)?;
    let program = resolve(program).ok_or_else(|| Reject::ProgramNotFound(program.clone()))?;

    let mut reduced_args = Vec::new();
    let mut inputs = Vec::new();
    let mut output = None;
    let mut target = None;
    let mut needs_explicit_target = false;
    let mut compilation = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let arg = arg.as_str();
        match arg {
            "-c" => compilation = true,
            "-o" => output = Some(value_of(arg, iter.next())?),
            "-MT" => target = Some(value_of(arg, iter.next())?),
            "-fprofile-use" => return Err(Reject::ProfileGuided),
            _ if FLAGS_WITH_VALUE.contains(&arg) => {
                let value = value_of(arg, iter.next())?;
                reduced_args.push(arg.to_string());
                reduced_args.push(value);
            }
            _ => {
                if DEPENDENCY_FLAGS.contains(&arg) {
                    needs_explicit_target = true;
                }
                if arg.starts_with('-') && arg.len() > 1 {
                    reduced_args.push(arg.to_string());
                } else {
                    inputs.push(arg.to_string());
                }
            }
        }
    }

    if !compilation {
        return Err(Reject::NotCompilation);
    }
    let output = output.ok_or(Reject::MissingOutput)?;
    let input = match <[String; 1]>::try_from(inputs) {
        Ok([input]) => input,
        Err(inputs) => return Err(Reject::InputCount(inputs.len())),
    };
    if input == STDIN_INPUT {
        return Err(Reject::StdinInput);
    }
    let kind = SourceKind::from_path(Path::new(&input)).ok_or_else(|| {
        Reject::UnknownSourceKind(
            Path::new(&input)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;

    let dependency_target = needs_explicit_target.then(|| target.unwrap_or_else(|| output.clone()));

    debug!(
        program = %program.display(),
        input = %input,
        output = %output,
        kind = %kind,
        "Classified cacheable compilation"
    );

    Ok(Invocation {
        program,
        input,
        output,
        kind,
        args: args.to_vec(),
        reduced_args,
        dependency_target,
    })
}

fn value_of(flag: &str, value: Option<&String>) -> Result<String, Reject> {
    value
        .cloned()
        .ok_or_else(|| Reject::MissingValue(flag.to_string()))
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.exists() {
        return std::path::absolute(path).ok();
    }
    which::which(program).ok()
}
