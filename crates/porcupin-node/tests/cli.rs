//! CLI-surface smoke test for porcupin-node.
//!
//! The daemon's steady-state loop needs a live indexer and IPFS daemon, so a
//! full lifecycle test like chronx-node's belongs in a deployment's own
//! integration suite, not here. What we can assert without either: the
//! binary parses its (deliberately thin) argument surface and exits cleanly
//! on `--help`.

use std::process::Command;

#[test]
fn help_flag_describes_data_dir_and_config_args() {
    let bin = env!("CARGO_BIN_EXE_porcupin-node");
    let output = Command::new(bin)
        .arg("--help")
        .output()
        .expect("failed to spawn porcupin-node");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--data-dir"));
    assert!(stdout.contains("--config"));
}

#[test]
fn rejects_unknown_flags() {
    let bin = env!("CARGO_BIN_EXE_porcupin-node");
    let output = Command::new(bin)
        .arg("--not-a-real-flag")
        .output()
        .expect("failed to spawn porcupin-node");

    assert!(!output.status.success());
}
