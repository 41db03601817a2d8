//! Per-task deadlines on the monotonic clock.
//!
//! The controller runs several periodic activities at unrelated rates.
//! Instead of one timer each, a single [`Cadence`] holds the next-due time
//! of every [`Task`].  A task that fires is re-armed at `due + period`, so
//! a late tick does not push every later deadline back (no drift).  If the
//! loop fell so far behind that the re-armed deadline is already in the
//! past, the task is re-armed from `now` instead of firing in a burst.
//!
//! ```text
//!   due ──period──▶ due' ──period──▶ due''
//!         ▲ tick runs late here, due' is unchanged
//! ```

use crate::config::TimingConfig;

/// The periodic activities of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Task {
    Sensors,
    Schedule,
    Sync,
    Connectivity,
    History,
}

impl Task {
    pub const ALL: [Task; 5] = [
        Task::Sensors,
        Task::Schedule,
        Task::Sync,
        Task::Connectivity,
        Task::History,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    period_ms: u64,
    next_due_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Cadence {
    slots: [Slot; 5],
}

impl Cadence {
    /// Every task is due immediately at boot.
    pub fn new(timing: &TimingConfig, now_ms: u64) -> Self {
        let slot = |period_ms| Slot {
            period_ms,
            next_due_ms: now_ms,
        };
        Self {
            slots: [
                slot(timing.sensor_interval_ms),
                slot(timing.schedule_interval_ms),
                slot(timing.sync_interval_ms),
                slot(timing.connectivity_interval_ms),
                slot(timing.history_interval_ms),
            ],
        }
    }

    /// Returns `true` and re-arms the task if it is due at `now_ms`.
    pub fn take_due(&mut self, task: Task, now_ms: u64) -> bool {
        let slot = &mut self.slots[task.index()];
        if now_ms < slot.next_due_ms {
            return false;
        }
        slot.next_due_ms = slot.next_due_ms.saturating_add(slot.period_ms);
        if slot.next_due_ms <= now_ms {
            slot.next_due_ms = now_ms.saturating_add(slot.period_ms);
        }
        true
    }

    pub fn is_due(&self, task: Task, now_ms: u64) -> bool {
        now_ms >= self.slots[task.index()].next_due_ms
    }

    /// Force a task to run on the next tick.
    pub fn expedite(&mut self, task: Task, now_ms: u64) {
        let slot = &mut self.slots[task.index()];
        slot.next_due_ms = slot.next_due_ms.min(now_ms);
    }

    /// Push a due task back to `until_ms` without running it.
    pub fn defer(&mut self, task: Task, until_ms: u64) {
        let slot = &mut self.slots[task.index()];
        slot.next_due_ms = slot.next_due_ms.max(until_ms);
    }

    pub fn next_due(&self, task: Task) -> u64 {
        self.slots[task.index()].next_due_ms
    }

    /// Earliest deadline across all tasks; the loop may sleep until then.
    pub fn next_deadline(&self) -> u64 {
        self.slots
            .iter()
            .map(|s| s.next_due_ms)
            .min()
            .unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    fn timing() -> TimingConfig {
        ControllerConfig::default().timing
    }

    #[test]
    fn everything_due_at_boot() {
        let mut c = Cadence::new(&timing(), 1_000);
        for task in Task::ALL {
            assert!(c.take_due(task, 1_000), "{task:?} not due at boot");
        }
        assert!(!c.take_due(Task::Sensors, 1_000));
    }

    #[test]
    fn late_tick_does_not_accumulate_drift() {
        let mut c = Cadence::new(&timing(), 0);
        assert!(c.take_due(Task::Sensors, 0));
        // Tick arrives 300 ms late.
        assert!(c.take_due(Task::Sensors, 5_300));
        assert_eq!(c.next_due(Task::Sensors), 10_000);
    }

    #[test]
    fn long_stall_rearms_from_now() {
        let mut c = Cadence::new(&timing(), 0);
        assert!(c.take_due(Task::Sensors, 0));
        assert!(c.take_due(Task::Sensors, 23_000));
        assert_eq!(c.next_due(Task::Sensors), 28_000);
        assert!(!c.take_due(Task::Sensors, 23_001));
    }

    #[test]
    fn next_deadline_is_the_minimum() {
        let mut c = Cadence::new(&timing(), 0);
        for task in Task::ALL {
            c.take_due(task, 0);
        }
        assert_eq!(c.next_deadline(), 5_000);
        c.expedite(Task::Sync, 1_200);
        assert_eq!(c.next_deadline(), 1_200);
        assert!(c.is_due(Task::Sync, 1_200));
    }

    #[test]
    fn deferred_task_waits_for_the_given_time() {
        let mut c = Cadence::new(&timing(), 0);
        c.take_due(Task::Sensors, 0);
        c.defer(Task::Sync, c.next_due(Task::Sensors));
        assert!(!c.is_due(Task::Sync, 4_999));
        assert!(c.take_due(Task::Sync, 5_000));
        assert_eq!(c.next_due(Task::Sync), 15_000);
        // Never pulls a deadline forward.
        c.defer(Task::Sync, 1_000);
        assert_eq!(c.next_due(Task::Sync), 15_000);
    }
}
