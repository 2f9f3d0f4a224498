//! Classification and key derivation through the public API

#![allow(clippy::unwrap_used)]

use sccache_compiler::{Fingerprint, Reject, SourceKind, classify_with};
use std::ffi::OsString;
use std::path::PathBuf;

fn classify(args: &[&str]) -> Result<sccache_compiler::Invocation, Reject> {
    let command: Vec<OsString> = args.iter().map(OsString::from).collect();
    classify_with(&command, |program| Some(PathBuf::from("/toolchain/bin").join(program)))
}

#[test]
fn test_cacheable_shapes() {
    for (args, kind) in [
        (&["cc", "-c", "a.c", "-o", "a.o"][..], SourceKind::C),
        (&["c++", "-o", "a.o", "-c", "a.cc"][..], SourceKind::Cxx),
        (&["g++", "a.cpp", "-c", "-o", "a.o", "-O2"][..], SourceKind::Cxx),
        (&["clang++", "-c", "-o", "a.o", "a.cxx"][..], SourceKind::Cxx),
    ] {
        let invocation = classify(args).unwrap();
        assert_eq!(invocation.kind(), kind, "{args:?}");
        assert_eq!(invocation.output(), "a.o");
    }
}

#[test]
fn test_rejected_shapes() {
    for args in [
        &["cc", "a.c", "-o", "a.o"][..],
        &["cc", "-c", "a.c"][..],
        &["cc", "-c", "-o", "a.o"][..],
        &["cc", "-c", "a.c", "b.c", "-o", "a.o"][..],
        &["cc", "-c", "-", "-o", "a.o"][..],
        &["cc", "-c", "a.f90", "-o", "a.o"][..],
        &["cc", "-c", "a.c", "-o", "a.o", "-fprofile-use"][..],
    ] {
        assert!(classify(args).is_err(), "{args:?}");
    }
}

#[test]
fn test_profile_use_wins_over_everything() {
    let err = classify(&["cc", "-fprofile-use", "-c", "a.c", "-o", "a.o"]).unwrap_err();
    assert_eq!(err, Reject::ProfileGuided);
    assert_eq!(err.to_string(), "profile-guided compilation (-fprofile-use)");
}

#[test]
fn test_dependency_target_only_reaches_preprocessor() {
    let invocation = classify(&["cc", "-M", "a.c", "-c", "-o", "a.o"]).unwrap();

    let preprocess = invocation.preprocess_args();
    let position = preprocess.iter().position(|a| a == "-MT").unwrap();
    assert_eq!(preprocess[position + 1], "a.o");

    assert!(!invocation.compile_args().iter().any(|a| a == "-MT"));
    assert!(!invocation.reduced_args().iter().any(|a| a == "-MT"));
}

#[test]
fn test_same_invocation_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let program = dir.path().join("cc");
    std::fs::write(&program, b"compiler").unwrap();

    let invocation = classify(&["cc", "-c", "a.c", "-o", "a.o"]).unwrap();
    let first = Fingerprint::derive(&program, invocation.args(), b"int main;").unwrap();
    let second = Fingerprint::derive(&program, invocation.args(), b"int main;").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), first.as_str());
}
