//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers, no closures and no
//! dynamic dispatch.
//!
//! ```text
//!  BOOTING ──[link up + first valid read]──▶ CONNECTED
//!     │                                        │    ▲
//!     │                         [N sync failures]   [sync ok + link up]
//!     │                                        ▼    │
//!     └──────────[N sync failures]──────────▶ DEGRADED
//!
//!  Any state ──[all sensors lost for safe_mode_after_ms]──▶ SAFE_MODE
//!  SAFE_MODE ──[a sensor recovers]──▶ CONNECTED (or DEGRADED if sync is still failing)
//! ```

use super::context::SupervisorContext;
use super::{LinkState, StateDescriptor};
use crate::drivers::status_led::LedPattern;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; LinkState::COUNT] {
    [
        // Index 0: Booting
        StateDescriptor {
            id: LinkState::Booting,
            name: "Booting",
            on_enter: Some(booting_enter),
            on_exit: None,
            on_update: booting_update,
        },
        // Index 1: Connected
        StateDescriptor {
            id: LinkState::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: None,
            on_update: connected_update,
        },
        // Index 2: Degraded
        StateDescriptor {
            id: LinkState::Degraded,
            name: "Degraded",
            on_enter: Some(degraded_enter),
            on_exit: Some(degraded_exit),
            on_update: degraded_update,
        },
        // Index 3: SafeMode
        StateDescriptor {
            id: LinkState::SafeMode,
            name: "SafeMode",
            on_enter: Some(safe_mode_enter),
            on_exit: Some(safe_mode_exit),
            on_update: safe_mode_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  BOOTING
// ═══════════════════════════════════════════════════════════════════════════

fn booting_enter(ctx: &mut SupervisorContext) {
    ctx.outputs.led = LedPattern::FastBlink;
    ctx.outputs.pull_enabled = true;
}

fn booting_update(ctx: &mut SupervisorContext) -> Option<LinkState> {
    if ctx.sustained_sensor_loss() {
        return Some(LinkState::SafeMode);
    }
    if ctx.health.link_up && ctx.health.initial_read_ok {
        return Some(LinkState::Connected);
    }
    if ctx.sync_degraded() {
        return Some(LinkState::Degraded);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter(ctx: &mut SupervisorContext) {
    info!("link healthy, remote sync active");
    ctx.outputs.led = LedPattern::Solid;
    ctx.outputs.pull_enabled = true;
}

fn connected_update(ctx: &mut SupervisorContext) -> Option<LinkState> {
    if ctx.sustained_sensor_loss() {
        return Some(LinkState::SafeMode);
    }
    if ctx.sync_degraded() {
        return Some(LinkState::Degraded);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEGRADED: local control continues, command pulls are skipped
// ═══════════════════════════════════════════════════════════════════════════

fn degraded_enter(ctx: &mut SupervisorContext) {
    warn!(
        "{} consecutive sync failures, running on local control",
        ctx.health.sync_failures
    );
    ctx.outputs.led = LedPattern::SlowBlink;
    ctx.outputs.pull_enabled = false;
}

fn degraded_exit(ctx: &mut SupervisorContext) {
    ctx.outputs.pull_enabled = true;
}

fn degraded_update(ctx: &mut SupervisorContext) -> Option<LinkState> {
    if ctx.sustained_sensor_loss() {
        return Some(LinkState::SafeMode);
    }
    if ctx.health.link_up && ctx.health.sync_failures == 0 {
        return Some(LinkState::Connected);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFE MODE: every relay held off until a sensor answers again
// ═══════════════════════════════════════════════════════════════════════════

fn safe_mode_enter(ctx: &mut SupervisorContext) {
    warn!("all sensors lost, forcing every relay off");
    ctx.outputs.safe_mode = true;
    ctx.outputs.led = LedPattern::RapidBlink;
    ctx.outputs.pull_enabled = true;
}

fn safe_mode_exit(ctx: &mut SupervisorContext) {
    info!("sensors recovered, leaving safe mode");
    ctx.outputs.safe_mode = false;
}

fn safe_mode_update(ctx: &mut SupervisorContext) -> Option<LinkState> {
    if !ctx.health.sensors_ok {
        return None;
    }
    if ctx.health.link_up && !ctx.sync_degraded() {
        Some(LinkState::Connected)
    } else {
        Some(LinkState::Degraded)
    }
}
