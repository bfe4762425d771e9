//! Mission entry form: the in-progress draft and who is allowed to edit it.
//!
//! ```text
//! Idle ──begin_manual/begin_edit──▶ ManualEditing ──submit/cancel──▶ Idle
//! Idle ──begin_voice──────────────▶ VoiceDriven ───end_voice───────▶ Idle
//!                                   VoiceDriven ───commit──▶ VoiceDriven (fresh draft)
//! ```
//!
//! While the assistant is dictating, the draft is read-only for manual input.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{FormError, ValidationError};
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{AlarmOffset, Category, NewTask, Repeat, Task, TaskPatch, Urgency, parse_date, parse_hhmm};

/// Draft fields the assistant (and the manual form) can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormField {
    Objective,
    Category,
    Priority,
    Time,
    Date,
    Alarm,
}

impl FromStr for FormField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "objective" | "title" => Ok(FormField::Objective),
            "category" => Ok(FormField::Category),
            "priority" | "urgency" => Ok(FormField::Priority),
            "time" => Ok(FormField::Time),
            "date" => Ok(FormField::Date),
            "alarm" => Ok(FormField::Alarm),
            _ => Err(ValidationError::invalid("field", s)),
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormField::Objective => "objective",
            FormField::Category => "category",
            FormField::Priority => "priority",
            FormField::Time => "time",
            FormField::Date => "date",
            FormField::Alarm => "alarm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub category: Category,
    pub urgency: Urgency,
    pub is_alarmed: bool,
    pub alarm_offset: AlarmOffset,
    pub repeat: Repeat,
    pub notes: String,
}

impl Draft {
    pub fn from_task(t: &Task) -> Self {
        Self {
            title: t.title.clone(),
            date: Some(t.date),
            time: Some(t.time),
            category: t.category,
            urgency: t.urgency,
            is_alarmed: t.is_alarmed,
            alarm_offset: t.alarm_offset,
            repeat: t.repeat,
            notes: t.notes.clone(),
        }
    }

    /// Interpret `value` for `field`. `today` anchors relative dates.
    pub fn set(&mut self, field: FormField, value: &str, today: NaiveDate) -> Result<(), ValidationError> {
        match field {
            FormField::Objective => {
                let v = value.trim();
                if v.is_empty() {
                    return Err(ValidationError::EmptyTitle);
                }
                self.title = v.to_string();
            }
            FormField::Category => self.category = value.parse()?,
            FormField::Priority => self.urgency = value.parse()?,
            FormField::Time => self.time = Some(parse_spoken_time(value)?),
            FormField::Date => self.date = Some(parse_spoken_date(value, today)?),
            FormField::Alarm => {
                let (on, offset) = parse_alarm(value)?;
                self.is_alarmed = on;
                self.alarm_offset = offset;
            }
        }
        Ok(())
    }

    pub fn to_new_task(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: None,
            date: self.date,
            time: self.time,
            category: self.category,
            urgency: self.urgency,
            is_alarmed: self.is_alarmed,
            alarm_offset: self.alarm_offset,
            repeat: self.repeat,
            notes: self.notes.clone(),
        }
    }

    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title.clone()),
            date: self.date,
            time: self.time,
            category: Some(self.category),
            urgency: Some(self.urgency),
            is_alarmed: Some(self.is_alarmed),
            alarm_offset: Some(self.alarm_offset),
            repeat: Some(self.repeat),
            notes: Some(self.notes.clone()),
            ..TaskPatch::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormMode {
    #[default]
    Idle,
    /// `editing` is the id of the mission being edited, `None` for a new one.
    ManualEditing { editing: Option<String> },
    VoiceDriven,
}

impl FormMode {
    fn label(&self) -> &'static str {
        match self {
            FormMode::Idle => "idle",
            FormMode::ManualEditing { .. } => "editing manually",
            FormMode::VoiceDriven => "voice driven",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryForm {
    mode: FormMode,
    draft: Draft,
}

impl EntryForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    fn wrong_mode(&self, attempted: &'static str) -> FormError {
        FormError::WrongMode {
            attempted,
            mode: self.mode.label(),
        }
    }

    pub fn begin_manual(&mut self) -> Result<(), FormError> {
        if self.mode == FormMode::VoiceDriven {
            return Err(self.wrong_mode("manual"));
        }
        self.mode = FormMode::ManualEditing { editing: None };
        self.draft = Draft::default();
        Ok(())
    }

    pub fn begin_edit(&mut self, task: &Task) -> Result<(), FormError> {
        if self.mode == FormMode::VoiceDriven {
            return Err(self.wrong_mode("manual"));
        }
        self.mode = FormMode::ManualEditing {
            editing: Some(task.id.clone()),
        };
        self.draft = Draft::from_task(task);
        Ok(())
    }

    pub fn begin_voice(&mut self) -> Result<(), FormError> {
        if self.mode != FormMode::Idle {
            return Err(self.wrong_mode("voice"));
        }
        self.mode = FormMode::VoiceDriven;
        self.draft = Draft::default();
        Ok(())
    }

    /// Manual field edit. Rejected while the assistant is dictating.
    pub fn set_manual(&mut self, field: FormField, value: &str, today: NaiveDate) -> Result<(), FormError> {
        if !matches!(self.mode, FormMode::ManualEditing { .. }) {
            return Err(self.wrong_mode("manual"));
        }
        self.draft.set(field, value, today)?;
        Ok(())
    }

    /// Typed manual edit for fields the assistant never touches (repeat, notes).
    pub fn edit_manual(&mut self, f: impl FnOnce(&mut Draft)) -> Result<(), FormError> {
        if !matches!(self.mode, FormMode::ManualEditing { .. }) {
            return Err(self.wrong_mode("manual"));
        }
        f(&mut self.draft);
        Ok(())
    }

    /// Field update coming from the assistant.
    pub fn apply_voice_update(&mut self, field: FormField, value: &str, today: NaiveDate) -> Result<(), FormError> {
        if self.mode != FormMode::VoiceDriven {
            return Err(self.wrong_mode("voice"));
        }
        self.draft.set(field, value, today)?;
        Ok(())
    }

    /// Save the manual draft: create, or update the mission being edited.
    pub fn submit<K: KeyValueStore>(
        &mut self,
        store: &mut TaskStore<K>,
        now: NaiveDateTime,
    ) -> Result<Task, FormError> {
        let FormMode::ManualEditing { editing } = &self.mode else {
            return Err(self.wrong_mode("submit"));
        };
        let saved = match editing {
            Some(id) => {
                if self.draft.title.trim().is_empty() {
                    return Err(ValidationError::EmptyTitle.into());
                }
                store
                    .update(id, self.draft.to_patch())
                    .ok_or_else(|| FormError::MissingTask(id.clone()))?
            }
            None => store.create(self.draft.to_new_task(), now)?,
        };
        self.cancel();
        Ok(saved)
    }

    /// Assistant finished gathering a mission: save it and start a fresh draft.
    pub fn commit_voice<K: KeyValueStore>(
        &mut self,
        store: &mut TaskStore<K>,
        now: NaiveDateTime,
    ) -> Result<Task, FormError> {
        if self.mode != FormMode::VoiceDriven {
            return Err(self.wrong_mode("commit"));
        }
        let saved = store.create(self.draft.to_new_task(), now)?;
        self.draft = Draft::default();
        Ok(saved)
    }

    pub fn end_voice(&mut self) {
        if self.mode == FormMode::VoiceDriven {
            self.cancel();
        }
    }

    pub fn cancel(&mut self) {
        self.mode = FormMode::Idle;
        self.draft = Draft::default();
    }
}

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2})(?:[:.](\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?\s*$").expect("valid clock regex")
});

static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,3})").expect("valid minutes regex"));

/// `19:05`, `7:05 pm`, `7pm`, `07.30`.
pub fn parse_spoken_time(value: &str) -> Result<NaiveTime, ValidationError> {
    if let Ok(t) = parse_hhmm(value) {
        return Ok(t);
    }
    let caps = CLOCK_RE
        .captures(value)
        .ok_or_else(|| ValidationError::invalid("time", value))?;
    let mut hour: u32 = caps[1].parse().map_err(|_| ValidationError::invalid("time", value))?;
    let minute: u32 = caps
        .get(2)
        .map(|m| m.as_str().parse().unwrap_or(60))
        .unwrap_or(0);
    if let Some(meridiem) = caps.get(3) {
        if hour == 0 || hour > 12 {
            return Err(ValidationError::invalid("time", value));
        }
        let pm = meridiem.as_str().to_lowercase().starts_with('p');
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| ValidationError::invalid("time", value))
}

/// ISO dates plus `today` / `tomorrow` / `day after tomorrow`.
pub fn parse_spoken_date(value: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let norm = value.trim().to_lowercase();
    match norm.as_str() {
        "today" | "tonight" | "now" => Ok(today),
        "tomorrow" => Ok(today + Duration::days(1)),
        "day after tomorrow" => Ok(today + Duration::days(2)),
        _ => parse_date(&norm),
    }
}

/// Alarm answers: yes/no, or a lead time ("10 minutes before", "30").
pub fn parse_alarm(value: &str) -> Result<(bool, AlarmOffset), ValidationError> {
    let norm = value.trim().to_lowercase();
    if let Some(caps) = MINUTES_RE.captures(&norm) {
        let minutes: u32 = caps[1].parse().map_err(|_| ValidationError::invalid("alarm", value))?;
        return Ok((true, AlarmOffset::try_from(minutes)?));
    }
    let negative = ["no", "off", "false", "none", "disable", "skip", "don't", "dont"];
    if negative.iter().any(|n| norm.split_whitespace().any(|w| w == *n)) {
        return Ok((false, AlarmOffset::OnTime));
    }
    let positive = ["yes", "on", "true", "activate", "enable", "sure", "yeah", "ok", "okay"];
    if positive.iter().any(|p| norm.split_whitespace().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == *p)) {
        return Ok((true, AlarmOffset::OnTime));
    }
    Err(ValidationError::invalid("alarm", value))
}
