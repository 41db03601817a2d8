//! Fuzz target: remote command and schedule parsing
//!
//! Feeds arbitrary JSON documents (as pulled from the command and
//! schedule paths) to the wire parsers.  Malformed input must come back
//! as an error, never a panic.
//!
//! cargo fuzz run fuzz_remote_command

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartbuilding::app::commands::Command;
use smartbuilding::sync::wire::{parse_command, parse_rules};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(cmd) = parse_command("fuzz", &value) {
        match cmd.command {
            Command::SetRelay { relay, .. } | Command::ReleaseRelay { relay } => assert!(relay > 0),
            Command::UpsertRule(rule) => assert!(rule.relay_id > 0),
            Command::DeleteRule { .. } | Command::AckAlert { .. } => {}
        }
    }
    if let Ok(rules) = parse_rules(&value) {
        // Relay ids are 1-based; whether one exists is checked on apply.
        for rule in rules.into_iter().flatten() {
            assert!(rule.relay_id > 0);
        }
    }
});
