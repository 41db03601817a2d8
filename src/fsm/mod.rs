//! Function-pointer finite state machine for the supervisor link state.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌───────────┬───────────┬──────────┬───────────────────┐    │
//! │  │ LinkState │ on_enter  │ on_exit  │ on_update         │    │
//! │  ├───────────┼───────────┼──────────┼───────────────────┤    │
//! │  │ Booting   │ fn(ctx)   │ –        │ fn(ctx)->Option<> │    │
//! │  │ Connected │ fn(ctx)   │ –        │ fn(ctx)->Option<> │    │
//! │  │ Degraded  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │    │
//! │  │ SafeMode  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │    │
//! │  └───────────┴───────────┴──────────┴───────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next)`, the engine runs `on_exit` for the current
//! state, then `on_enter` for the next, and updates the current pointer.
//! All functions receive `&mut SupervisorContext`, which carries the
//! health inputs and the outputs the supervisor acts on.

pub mod context;
pub mod states;

use context::SupervisorContext;
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Supervisor states.  Must stay in sync with [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LinkState {
    Booting = 0,
    Connected = 1,
    Degraded = 2,
    SafeMode = 3,
}

impl LinkState {
    pub const COUNT: usize = 4;

    /// Convert an index back to `LinkState`.  Out-of-range indices map to
    /// `SafeMode` in release builds.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Booting,
            1 => Self::Connected,
            2 => Self::Degraded,
            3 => Self::SafeMode,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::SafeMode
            }
        }
    }
}

impl core::fmt::Display for LinkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Booting => "booting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::SafeMode => "safe_mode",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut SupervisorContext);

/// Per-tick update handler.  Returns `Some(next)` to trigger a transition.
pub type StateUpdateFn = fn(&mut SupervisorContext) -> Option<LinkState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: LinkState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `LinkState as usize`.
    table: [StateDescriptor; LinkState::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; LinkState::COUNT], initial: LinkState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut SupervisorContext) {
        info!("supervisor starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.  Returns the transition taken, if any.
    pub fn tick(&mut self, ctx: &mut SupervisorContext) -> Option<(LinkState, LinkState)> {
        let from = self.current_state();
        let next = (self.table[self.current].on_update)(ctx)?;
        if next == from {
            return None;
        }
        self.transition(next, ctx);
        Some((from, next))
    }

    /// Jump straight to `next`, running exit/enter actions.
    #[cfg(test)]
    pub fn force_transition(&mut self, next: LinkState, ctx: &mut SupervisorContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> LinkState {
        LinkState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: LinkState, ctx: &mut SupervisorContext) {
        let next_idx = next_id as usize;

        info!(
            "supervisor transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::SupervisorContext;
    use super::*;
    use crate::config::ControllerConfig;
    use crate::drivers::status_led::LedPattern;

    fn make_ctx() -> SupervisorContext {
        SupervisorContext::new(&ControllerConfig::default())
    }

    fn make_fsm(ctx: &mut SupervisorContext) -> Fsm {
        let mut fsm = Fsm::new(states::build_state_table(), LinkState::Booting);
        fsm.start(ctx);
        fsm
    }

    #[test]
    fn starts_booting_with_fast_blink() {
        let mut ctx = make_ctx();
        let fsm = make_fsm(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Booting);
        assert_eq!(ctx.outputs.led, LedPattern::FastBlink);
    }

    #[test]
    fn booting_waits_for_link_and_first_read() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);

        ctx.health.link_up = true;
        assert_eq!(fsm.tick(&mut ctx), None);

        ctx.health.initial_read_ok = true;
        assert_eq!(
            fsm.tick(&mut ctx),
            Some((LinkState::Booting, LinkState::Connected))
        );
        assert_eq!(ctx.outputs.led, LedPattern::Solid);
    }

    #[test]
    fn booting_without_network_degrades() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);
        ctx.health.initial_read_ok = true;
        ctx.health.sync_failures = ctx.degrade_after_failures;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Degraded);
    }

    #[test]
    fn connected_degrades_after_consecutive_failures() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);
        fsm.force_transition(LinkState::Connected, &mut ctx);

        for n in 1..ctx.degrade_after_failures {
            ctx.health.sync_failures = n;
            fsm.tick(&mut ctx);
            assert_eq!(fsm.current_state(), LinkState::Connected);
        }
        ctx.health.sync_failures = ctx.degrade_after_failures;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Degraded);
        assert!(!ctx.outputs.pull_enabled);
        assert!(!ctx.outputs.safe_mode);
    }

    #[test]
    fn degraded_recovers_on_successful_sync() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);
        fsm.force_transition(LinkState::Degraded, &mut ctx);

        ctx.health.link_up = true;
        ctx.health.sync_failures = 1;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Degraded);

        ctx.health.sync_failures = 0;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert!(ctx.outputs.pull_enabled);
    }

    #[test]
    fn sustained_sensor_loss_enters_safe_mode_from_any_state() {
        for start in [LinkState::Booting, LinkState::Connected, LinkState::Degraded] {
            let mut ctx = make_ctx();
            let mut fsm = make_fsm(&mut ctx);
            fsm.force_transition(start, &mut ctx);

            ctx.health.all_lost_since = Some(1_000);
            ctx.health.now_ms = 1_000 + ctx.safe_mode_after_ms - 1;
            fsm.tick(&mut ctx);
            assert_eq!(fsm.current_state(), start, "too early from {start:?}");

            ctx.health.now_ms = 1_000 + ctx.safe_mode_after_ms;
            fsm.tick(&mut ctx);
            assert_eq!(fsm.current_state(), LinkState::SafeMode, "from {start:?}");
            assert!(ctx.outputs.safe_mode);
            assert_eq!(ctx.outputs.led, LedPattern::RapidBlink);
        }
    }

    #[test]
    fn safe_mode_exits_when_a_sensor_answers() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);
        fsm.force_transition(LinkState::SafeMode, &mut ctx);

        for _ in 0..5 {
            fsm.tick(&mut ctx);
        }
        assert_eq!(fsm.current_state(), LinkState::SafeMode);

        ctx.health.sensors_ok = true;
        ctx.health.all_lost_since = None;
        ctx.health.link_up = true;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert!(!ctx.outputs.safe_mode);
    }

    #[test]
    fn safe_mode_exits_to_degraded_without_link() {
        let mut ctx = make_ctx();
        let mut fsm = make_fsm(&mut ctx);
        fsm.force_transition(LinkState::SafeMode, &mut ctx);
        ctx.health.sensors_ok = true;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Degraded);
        assert!(!ctx.outputs.safe_mode);
    }

    #[test]
    fn link_state_from_index_roundtrip() {
        for i in 0..LinkState::COUNT {
            assert_eq!(LinkState::from_index(i) as usize, i);
        }
    }
}
