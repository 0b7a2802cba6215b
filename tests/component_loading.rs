//! Purpose: Contract verification when a component is loaded.
//! Role: A rejected library must not see a single call beyond its checksums.
mod common;

use std::ffi::c_void;
use std::sync::atomic::Ordering;

use common::NATIVE_CALLS;
use uniwire::api::{Component, ErrorKind, RuntimeConfig};

extern "C" fn stale_checksum() -> u16 {
    0xbeef
}

extern "C" fn future_contract_version() -> u32 {
    99
}

#[test]
fn checksum_mismatch_rejects_before_any_call() {
    let _serial = common::serial();
    let symbols = common::demo_symbols()
        .with("uniwire_demo_checksum_func_divide", stale_checksum as *const c_void);
    let calls = NATIVE_CALLS.load(Ordering::SeqCst);

    let err = Component::load(symbols, &common::contract(), &common::demo_config())
        .expect_err("mismatch");
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert_eq!(err.symbol(), Some("uniwire_demo_checksum_func_divide"));
    assert!(err.hint().is_some());
    assert_eq!(NATIVE_CALLS.load(Ordering::SeqCst), calls);
}

#[test]
fn contract_version_mismatch_is_a_checksum_error() {
    let _serial = common::serial();
    let symbols = common::demo_symbols()
        .with("uniwire_contract_version", future_contract_version as *const c_void);
    let calls = NATIVE_CALLS.load(Ordering::SeqCst);

    let err = Component::load(symbols, &common::contract(), &common::demo_config())
        .expect_err("version");
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert_eq!(err.symbol(), Some("uniwire_contract_version"));
    assert_eq!(NATIVE_CALLS.load(Ordering::SeqCst), calls);
}

#[test]
fn missing_checksum_symbol_is_rejected() {
    let contract = common::contract().with_checksum("uniwire_demo_checksum_func_renamed", 7);
    let err = Component::load(common::demo_symbols(), &contract, &common::demo_config())
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert_eq!(err.symbol(), Some("uniwire_demo_checksum_func_renamed"));
}

#[test]
fn matching_contract_loads() {
    let component = Component::load(common::demo_symbols(), &common::contract(), &common::demo_config())
        .expect("load");
    assert_eq!(component.namespace(), "demo");
}

#[test]
fn library_override_points_at_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("libnowhere.so");
    let config = RuntimeConfig::from_lookup("demo", |key| {
        (key == "UNIWIRE_LIBRARY_OVERRIDE_DEMO").then(|| missing.display().to_string())
    })
    .expect("config");
    assert_eq!(config.library_override.as_deref(), Some(missing.as_path()));

    let err = Component::open(&common::contract(), &config).expect_err("load");
    assert_eq!(err.kind(), ErrorKind::Load);
}
