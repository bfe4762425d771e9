//! Rolling transcript of assistant conversations, fed back into prompts.

use chrono::NaiveTime;

use crate::storage::{KeyValueStore, MEMORY_BANK_KEY, load_json, save_json};

/// Lines kept; older ones fall off the front.
pub const MEMORY_LIMIT: usize = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBank {
    lines: Vec<String>,
}

impl MemoryBank {
    pub fn load(kv: &dyn KeyValueStore) -> Self {
        let mut lines: Vec<String> = load_json(kv, MEMORY_BANK_KEY).unwrap_or_default();
        trim_front(&mut lines);
        Self { lines }
    }

    pub fn save(&self, kv: &mut dyn KeyValueStore) {
        if let Err(e) = save_json(kv, MEMORY_BANK_KEY, &self.lines) {
            tracing::warn!(error = %e, "failed to persist memory bank");
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Record one finished exchange. Empty exchanges are skipped.
    pub fn push_turn(&mut self, at: NaiveTime, user: &str, assistant: &str) -> bool {
        let (user, assistant) = (user.trim(), assistant.trim());
        if user.is_empty() && assistant.is_empty() {
            return false;
        }
        self.lines.push(format!("[{}] User: {}", at.format("%H:%M:%S"), user));
        self.lines.push(format!("Ria: {}", assistant));
        trim_front(&mut self.lines);
        true
    }
}

fn trim_front(lines: &mut Vec<String>) {
    if lines.len() > MEMORY_LIMIT {
        let excess = lines.len() - MEMORY_LIMIT;
        lines.drain(..excess);
    }
}
