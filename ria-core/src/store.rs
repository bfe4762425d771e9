//! TaskStore: the authoritative mission list, mirrored to a key-value store.
//!
//! Every mutation rewrites the whole collection under [`TASKS_KEY`]. Loading
//! never fails: a missing or corrupt blob yields an empty ledger. The undo
//! slot is kept under [`UNDO_KEY`] so `restore` works across restarts.
//!
//! Other components (alarm monitor, form, assistant) mutate tasks only through
//! these operations.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::storage::{KeyValueStore, TASKS_KEY, UNDO_KEY, load_json, save_json};
use crate::task::{NewTask, Task, TaskPatch};

#[derive(Debug)]
pub struct TaskStore<K: KeyValueStore> {
    kv: K,
    tasks: Vec<Task>,
    // single-slot undo buffer: (index it was removed from, task)
    last_deleted: Option<(usize, Task)>,
}

impl<K: KeyValueStore> TaskStore<K> {
    /// Rehydrate from `kv`, failing closed to an empty collection.
    pub fn load(kv: K) -> Self {
        let tasks: Vec<Task> = load_json(&kv, TASKS_KEY).unwrap_or_default();
        let last_deleted = load_json(&kv, UNDO_KEY);
        tracing::debug!(count = tasks.len(), "loaded mission ledger");
        Self {
            kv,
            tasks,
            last_deleted,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Display order: newest date first, then by time.
    pub fn sorted_by_date_desc(&self) -> Vec<&Task> {
        let mut out: Vec<&Task> = self.tasks.iter().collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(a.time.cmp(&b.time)));
        out
    }

    pub fn for_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.date == date).collect()
    }

    /// Missions for `date` that still need work.
    pub fn active_for_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.date == date && !t.is_completed)
            .collect()
    }

    /// Auxiliary keys (plan, advice, language, ...) live next to the ledger.
    pub fn storage(&self) -> &K {
        &self.kv
    }

    pub fn storage_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    /// Create a mission. `now` fills in a missing date/time (minute precision).
    pub fn create(&mut self, fields: NewTask, now: NaiveDateTime) -> Result<Task, ValidationError> {
        let title = fields.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }

        let now_time = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now.time());
        let mut task = Task::new(
            self.next_id(),
            title,
            fields.date.unwrap_or(now.date()),
            fields.time.unwrap_or(now_time),
        );
        task.description = fields.description.filter(|d| !d.trim().is_empty());
        task.category = fields.category;
        task.urgency = fields.urgency;
        task.is_alarmed = fields.is_alarmed;
        task.alarm_offset = fields.alarm_offset;
        task.repeat = fields.repeat;
        task.notes = fields.notes;

        self.tasks.push(task.clone());
        self.persist();
        Ok(task)
    }

    /// Merge `patch` into the mission `id`. Unknown ids are a no-op.
    pub fn update(&mut self, id: &str, mut patch: TaskPatch) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        // an edit can't blank the objective
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            patch.title = None;
        }
        patch.apply(task);
        let out = task.clone();
        self.persist();
        Some(out)
    }

    pub fn delete(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(idx);
        self.last_deleted = Some((idx, task.clone()));
        self.persist();
        self.persist_undo();
        Some(task)
    }

    /// Put back the most recently deleted mission, at its old position.
    pub fn restore(&mut self) -> Option<Task> {
        let (idx, task) = self.last_deleted.take()?;
        self.persist_undo();
        if self.get(&task.id).is_some() {
            return None;
        }
        let idx = idx.min(self.tasks.len());
        self.tasks.insert(idx, task.clone());
        self.persist();
        Some(task)
    }

    pub fn can_restore(&self) -> bool {
        self.last_deleted.is_some()
    }

    fn next_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    fn persist_undo(&mut self) {
        let res = match &self.last_deleted {
            Some(slot) => save_json(&mut self.kv, UNDO_KEY, slot),
            None => self.kv.remove(UNDO_KEY),
        };
        if let Err(e) = res {
            tracing::warn!(error = %e, "failed to persist undo slot");
        }
    }

    fn persist(&mut self) {
        if let Err(e) = save_json(&mut self.kv, TASKS_KEY, &self.tasks) {
            tracing::warn!(error = %e, "failed to persist mission ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::task::{Urgency, parse_date, parse_hhmm};

    fn now() -> NaiveDateTime {
        parse_date("2026-03-02")
            .unwrap()
            .and_hms_opt(14, 7, 45)
            .unwrap()
    }

    fn store() -> TaskStore<MemoryStore> {
        TaskStore::load(MemoryStore::new())
    }

    #[test]
    fn create_rejects_blank_objective() {
        let mut s = store();
        let err = s.create(NewTask::titled("   "), now()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
        assert!(s.is_empty());
        assert!(s.storage().is_empty());
    }

    #[test]
    fn create_defaults_date_and_time_to_now() {
        let mut s = store();
        let t = s.create(NewTask::titled("  Write report "), now()).unwrap();
        assert_eq!(t.title, "Write report");
        assert_eq!(t.date, parse_date("2026-03-02").unwrap());
        assert_eq!(t.time, parse_hhmm("14:07").unwrap());
        assert!(!t.is_completed);
    }

    #[test]
    fn ids_are_unique() {
        let mut s = store();
        let a = s.create(NewTask::titled("a"), now()).unwrap();
        let b = s.create(NewTask::titled("b"), now()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn full_progress_marks_completed() {
        let mut s = store();
        let t = s.create(NewTask::titled("Run"), now()).unwrap();
        let t = s.update(&t.id, TaskPatch::progress(100)).unwrap();
        assert!(t.is_completed);
        assert!(s.get(&t.id).unwrap().is_completed);
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let mut s = store();
        s.create(NewTask::titled("Run"), now()).unwrap();
        let before = s.tasks().to_vec();
        assert!(s.update("nope", TaskPatch::progress(50)).is_none());
        assert_eq!(s.tasks(), &before[..]);
    }

    #[test]
    fn update_keeps_title_when_patch_title_is_blank() {
        let mut s = store();
        let t = s.create(NewTask::titled("Run"), now()).unwrap();
        let patch = TaskPatch {
            title: Some(" ".into()),
            urgency: Some(Urgency::Urgent),
            ..TaskPatch::default()
        };
        let t = s.update(&t.id, patch).unwrap();
        assert_eq!(t.title, "Run");
        assert_eq!(t.urgency, Urgency::Urgent);
    }

    #[test]
    fn delete_then_restore_is_identity() {
        let mut s = store();
        for name in ["a", "b", "c"] {
            s.create(NewTask::titled(name), now()).unwrap();
        }
        let before = s.tasks().to_vec();
        let mid = before[1].id.clone();

        s.delete(&mid).unwrap();
        assert_eq!(s.len(), 2);
        assert!(s.restore().is_some());
        assert_eq!(s.tasks(), &before[..]);

        // nothing held any more
        assert!(s.restore().is_none());
        assert_eq!(s.tasks(), &before[..]);
    }

    #[test]
    fn undo_slot_only_holds_latest_delete() {
        let mut s = store();
        let a = s.create(NewTask::titled("a"), now()).unwrap();
        let b = s.create(NewTask::titled("b"), now()).unwrap();
        s.delete(&a.id);
        s.delete(&b.id);
        assert_eq!(s.restore().unwrap().id, b.id);
        assert!(s.get(&a.id).is_none());
    }

    #[test]
    fn persisted_blob_matches_memory_after_mutations() {
        let mut s = store();
        let a = s.create(NewTask::titled("a"), now()).unwrap();
        s.create(NewTask::titled("b"), now()).unwrap();
        s.delete(&a.id);
        s.create(NewTask::titled("c"), now()).unwrap();

        let raw = s.storage().get(TASKS_KEY).unwrap().unwrap();
        let decoded: Vec<Task> = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, s.tasks());
    }

    #[test]
    fn undo_slot_survives_reload() {
        let mut s = store();
        s.create(NewTask::titled("a"), now()).unwrap();
        let b = s.create(NewTask::titled("b"), now()).unwrap();
        s.delete(&b.id);

        let mut reloaded = TaskStore::load(s.storage().clone());
        assert!(reloaded.can_restore());
        assert_eq!(reloaded.restore().unwrap().id, b.id);
        assert!(reloaded.storage().get(UNDO_KEY).unwrap().is_none());

        let again = TaskStore::load(reloaded.storage().clone());
        assert!(!again.can_restore());
    }

    #[test]
    fn corrupt_blob_loads_empty() {
        let mut kv = MemoryStore::new();
        kv.set(TASKS_KEY, "[{\"id\": 12").unwrap();
        let s = TaskStore::load(kv);
        assert!(s.is_empty());
    }

    #[test]
    fn display_order_is_date_desc() {
        let mut s = store();
        let mut early = NewTask::titled("early");
        early.date = Some(parse_date("2026-01-01").unwrap());
        let mut late = NewTask::titled("late");
        late.date = Some(parse_date("2026-05-01").unwrap());
        s.create(early, now()).unwrap();
        s.create(late, now()).unwrap();

        let titles: Vec<&str> = s.sorted_by_date_desc().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["late", "early"]);
    }
}
