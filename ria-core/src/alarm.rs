//! Alarm monitor: decides which mission is ringing.
//!
//! The caller drives it: `poll` on a fixed interval with the local wall-clock
//! time, `ring` on a shorter cadence while an alarm is active, and one of
//! `stop` / `snooze` / `postpone` when the user resolves it.
//!
//! Policy:
//! - at most one active alarm; first due task in store order wins
//! - a task is due when `trigger <= now < trigger + window`, where
//!   `trigger = scheduled - alarm_offset`
//! - daily tasks only compare the time of day
//! - a snooze is stored on the task (`snoozed_until`), so it survives restarts;
//!   when it elapses the task rings again if it is still armed

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::VecDeque;

use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{Repeat, Task, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmPolicy {
    /// How long after the trigger instant a poll still counts as "due".
    pub window: Duration,
    /// Cadence of the audible/visual signal while ringing.
    pub ring_interval: std::time::Duration,
}

impl Default for AlarmPolicy {
    fn default() -> Self {
        Self {
            window: Duration::seconds(60),
            ring_interval: std::time::Duration::from_millis(1200),
        }
    }
}

/// Emits one pulse of the alarm signal. Failures are expected (no audio
/// device, blocked output) and never stop the alarm.
pub trait Ringer {
    fn ring(&mut self, task: &Task) -> std::io::Result<()>;
}

/// Trigger instants for `task` near `now`. Daily tasks get today's and
/// tomorrow's occurrence so a lead time crossing midnight still matches.
fn trigger_instants(task: &Task, now: NaiveDateTime) -> Vec<NaiveDateTime> {
    let lead = Duration::minutes(i64::from(task.alarm_offset.minutes()));
    match task.repeat {
        Repeat::Once => vec![task.scheduled_at() - lead],
        Repeat::Daily => {
            let today = now.date();
            [Some(today), today.succ_opt()]
                .into_iter()
                .flatten()
                .map(|d| d.and_time(task.time) - lead)
                .collect()
        }
    }
}

fn is_eligible(task: &Task) -> bool {
    task.is_alarmed && !task.is_completed && !task.is_snoozed
}

/// True when `task` should start ringing at `now`.
pub fn is_due(task: &Task, now: NaiveDateTime, window: Duration) -> bool {
    if !is_eligible(task) {
        return false;
    }
    trigger_instants(task, now).into_iter().any(|trigger| {
        let in_window = trigger <= now && now < trigger + window;
        let acknowledged = task.repeat == Repeat::Daily && task.acknowledged_on == Some(trigger.date());
        in_window && !acknowledged
    })
}

#[derive(Debug, Default)]
pub struct AlarmMonitor {
    policy: AlarmPolicy,
    active: Option<String>,
    // tasks whose snooze elapsed, waiting for the slot to free up
    rerings: VecDeque<String>,
}

impl AlarmMonitor {
    pub fn new(policy: AlarmPolicy) -> Self {
        Self {
            policy,
            active: None,
            rerings: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> &AlarmPolicy {
        &self.policy
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_task<'a, K: KeyValueStore>(&self, store: &'a TaskStore<K>) -> Option<&'a Task> {
        self.active.as_deref().and_then(|id| store.get(id))
    }

    /// One polling step. Returns the task that just became the active alarm.
    pub fn poll<K: KeyValueStore>(&mut self, store: &mut TaskStore<K>, now: NaiveDateTime) -> Option<Task> {
        self.release_snoozes(store, now);

        if let Some(id) = &self.active {
            // deleted or finished while ringing: let the slot go
            let still_valid = store.get(id).is_some_and(|t| t.is_alarmed && !t.is_completed);
            if still_valid {
                return None;
            }
            tracing::debug!(id = %id, "active alarm no longer valid, clearing");
            self.active = None;
        }

        while let Some(id) = self.rerings.pop_front() {
            if let Some(task) = store.get(&id).filter(|t| is_eligible(t)) {
                let task = task.clone();
                tracing::info!(id = %task.id, title = %task.title, "snoozed alarm ringing again");
                self.active = Some(task.id.clone());
                return Some(task);
            }
        }

        let window = self.policy.window;
        let task = store.tasks().iter().find(|t| is_due(t, now, window))?.clone();
        tracing::info!(id = %task.id, title = %task.title, "alarm triggered");
        self.active = Some(task.id.clone());
        Some(task)
    }

    /// Emit one signal pulse for the active alarm. Errors are swallowed.
    pub fn ring<K: KeyValueStore>(&self, store: &TaskStore<K>, ringer: &mut dyn Ringer) -> bool {
        let Some(task) = self.active_task(store) else {
            return false;
        };
        if let Err(e) = ringer.ring(task) {
            tracing::debug!(error = %e, "alarm sound unavailable");
        }
        true
    }

    /// Acknowledge the active alarm. One-off missions are disarmed; daily
    /// missions stay armed but stay quiet for the rest of `now`'s date.
    pub fn stop<K: KeyValueStore>(&mut self, store: &mut TaskStore<K>, now: NaiveDateTime) -> Option<Task> {
        let id = self.active.take()?;
        let repeat = store.get(&id)?.repeat;
        let patch = match repeat {
            Repeat::Once => TaskPatch {
                is_alarmed: Some(false),
                ..TaskPatch::default()
            },
            Repeat::Daily => TaskPatch {
                acknowledged_on: Some(Some(now.date())),
                ..TaskPatch::default()
            },
        };
        store.update(&id, patch)
    }

    /// Silence the active alarm for `minutes`; it rings again afterwards.
    pub fn snooze<K: KeyValueStore>(
        &mut self,
        store: &mut TaskStore<K>,
        minutes: u32,
        now: NaiveDateTime,
    ) -> Option<Task> {
        let id = self.active.take()?;
        let until = now + Duration::minutes(i64::from(minutes));
        store.update(
            &id,
            TaskPatch {
                is_snoozed: Some(true),
                snoozed_until: Some(Some(until)),
                ..TaskPatch::default()
            },
        )
    }

    /// Move the active alarm's mission to a new date/time and re-arm it.
    pub fn postpone<K: KeyValueStore>(
        &mut self,
        store: &mut TaskStore<K>,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Option<Task> {
        let id = self.active.take()?;
        self.rerings.retain(|r| r != &id);
        store.update(
            &id,
            TaskPatch {
                date: Some(date),
                time: Some(time),
                is_snoozed: Some(false),
                snoozed_until: Some(None),
                is_alarmed: Some(true),
                acknowledged_on: Some(None),
                ..TaskPatch::default()
            },
        )
    }

    fn release_snoozes<K: KeyValueStore>(&mut self, store: &mut TaskStore<K>, now: NaiveDateTime) {
        let elapsed: Vec<(String, bool)> = store
            .tasks()
            .iter()
            .filter(|t| t.is_snoozed)
            .filter_map(|t| match t.snoozed_until {
                Some(until) if until <= now => Some((t.id.clone(), true)),
                Some(_) => None,
                // snoozed without a deadline: release quietly
                None => Some((t.id.clone(), false)),
            })
            .collect();

        for (id, rering) in elapsed {
            store.update(
                &id,
                TaskPatch {
                    is_snoozed: Some(false),
                    snoozed_until: Some(None),
                    ..TaskPatch::default()
                },
            );
            if rering && !self.rerings.contains(&id) {
                self.rerings.push_back(id);
            }
        }
    }
}
