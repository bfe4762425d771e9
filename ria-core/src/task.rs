//! Mission (task) model shared by the store, the alarm monitor and scoring.
//!
//! Field names on the wire follow the camelCase layout of the persisted
//! `tasks` blob so existing ledgers load unchanged.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "routine")]
    Routine,
    /// "5x speed" missions.
    #[serde(rename = "5x", alias = "accelerated")]
    Accelerated,
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase();
        if norm.contains("routine") {
            return Ok(Category::Routine);
        }
        if norm.contains("5x") || norm.contains("accelerat") || norm.contains("speed") {
            return Ok(Category::Accelerated);
        }
        Err(ValidationError::invalid("category", s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Routine => f.write_str("routine"),
            Category::Accelerated => f.write_str("5x"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Urgency {
    #[default]
    #[serde(alias = "regular")]
    Regular,
    #[serde(alias = "important", alias = "Priority", alias = "priority")]
    Important,
    #[serde(alias = "urgent")]
    Urgent,
}

impl Urgency {
    /// Scoring multiplier.
    pub fn multiplier(self) -> u32 {
        match self {
            Urgency::Regular => 1,
            Urgency::Important => 2,
            Urgency::Urgent => 3,
        }
    }
}

impl FromStr for Urgency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase();
        if norm.contains("urgent") {
            Ok(Urgency::Urgent)
        } else if norm.contains("important") || norm.contains("priority") || norm.contains("high") {
            Ok(Urgency::Important)
        } else if norm.contains("regular") || norm.contains("normal") || norm.contains("low") {
            Ok(Urgency::Regular)
        } else {
            Err(ValidationError::invalid("urgency", s))
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Regular => f.write_str("Regular"),
            Urgency::Important => f.write_str("Important"),
            Urgency::Urgent => f.write_str("Urgent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    #[default]
    Once,
    Daily,
}

impl FromStr for Repeat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" | "none" | "no" => Ok(Repeat::Once),
            "daily" | "every day" | "everyday" => Ok(Repeat::Daily),
            _ => Err(ValidationError::invalid("repeat", s)),
        }
    }
}

/// Lead time before the scheduled minute at which the alarm rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AlarmOffset {
    #[default]
    OnTime,
    TenMinutes,
    ThirtyMinutes,
}

impl AlarmOffset {
    pub fn minutes(self) -> u32 {
        match self {
            AlarmOffset::OnTime => 0,
            AlarmOffset::TenMinutes => 10,
            AlarmOffset::ThirtyMinutes => 30,
        }
    }
}

impl TryFrom<u32> for AlarmOffset {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            0 => Ok(AlarmOffset::OnTime),
            10 => Ok(AlarmOffset::TenMinutes),
            30 => Ok(AlarmOffset::ThirtyMinutes),
            other => Err(ValidationError::invalid("alarmOffset", other.to_string())),
        }
    }
}

impl From<AlarmOffset> for u32 {
    fn from(offset: AlarmOffset) -> Self {
        offset.minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
}

/// Core mission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,

    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub urgency: Urgency,

    /// 0-100.
    #[serde(default)]
    pub completion_percentage: u8,

    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub interim_notes: String,

    #[serde(default)]
    pub is_alarmed: bool,
    #[serde(default)]
    pub alarm_offset: AlarmOffset,
    #[serde(default)]
    pub is_snoozed: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub repeat: Repeat,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubTask>,

    /// End of the current snooze window, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<NaiveDateTime>,

    /// Date on which a daily alarm was stopped; it stays quiet for that date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_on: Option<NaiveDate>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            date,
            time,
            category: Category::Routine,
            urgency: Urgency::Regular,
            completion_percentage: 0,
            notes: String::new(),
            interim_notes: String::new(),
            is_alarmed: false,
            alarm_offset: AlarmOffset::OnTime,
            is_snoozed: false,
            is_completed: false,
            repeat: Repeat::Once,
            subtasks: Vec::new(),
            snoozed_until: None,
            acknowledged_on: None,
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_completion(mut self, pct: u8) -> Self {
        self.completion_percentage = pct.min(100);
        self.is_completed = self.completion_percentage == 100;
        self
    }

    pub fn with_alarm(mut self, offset: AlarmOffset) -> Self {
        self.is_alarmed = true;
        self.alarm_offset = offset;
        self
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Fields accepted by `TaskStore::create`. Date/time default to "now".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub category: Category,
    pub urgency: Urgency,
    pub is_alarmed: bool,
    pub alarm_offset: AlarmOffset,
    pub repeat: Repeat,
    pub notes: String,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update merged into an existing task. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub category: Option<Category>,
    pub urgency: Option<Urgency>,
    pub completion_percentage: Option<u8>,
    pub notes: Option<String>,
    pub interim_notes: Option<String>,
    pub is_alarmed: Option<bool>,
    pub alarm_offset: Option<AlarmOffset>,
    pub is_snoozed: Option<bool>,
    pub is_completed: Option<bool>,
    pub repeat: Option<Repeat>,
    pub subtasks: Option<Vec<SubTask>>,
    pub snoozed_until: Option<Option<NaiveDateTime>>,
    pub acknowledged_on: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub fn progress(pct: u8) -> Self {
        Self {
            completion_percentage: Some(pct),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(self, t: &mut Task) {
        if let Some(v) = self.title {
            t.title = v;
        }
        if let Some(v) = self.description {
            t.description = Some(v);
        }
        if let Some(v) = self.date {
            t.date = v;
        }
        if let Some(v) = self.time {
            t.time = v;
        }
        if let Some(v) = self.category {
            t.category = v;
        }
        if let Some(v) = self.urgency {
            t.urgency = v;
        }
        if let Some(v) = self.notes {
            t.notes = v;
        }
        if let Some(v) = self.interim_notes {
            t.interim_notes = v;
        }
        if let Some(v) = self.is_alarmed {
            t.is_alarmed = v;
        }
        if let Some(v) = self.alarm_offset {
            t.alarm_offset = v;
        }
        if let Some(v) = self.is_snoozed {
            t.is_snoozed = v;
        }
        if let Some(v) = self.repeat {
            t.repeat = v;
        }
        if let Some(v) = self.subtasks {
            t.subtasks = v;
        }
        if let Some(v) = self.snoozed_until {
            t.snoozed_until = v;
        }
        if let Some(v) = self.acknowledged_on {
            t.acknowledged_on = v;
        }

        // completion: an explicit percentage wins, then an explicit flag
        if let Some(pct) = self.completion_percentage {
            t.completion_percentage = pct.min(100);
            t.is_completed = t.completion_percentage == 100;
        } else if let Some(done) = self.is_completed {
            t.is_completed = done;
            if done {
                t.completion_percentage = 100;
            }
        }
    }
}

/// Parse `HH:MM` (24h). Seconds are accepted and dropped.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ValidationError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
        .and_then(|t| NaiveTime::from_hms_opt(t.hour(), t.minute(), 0))
        .ok_or_else(|| ValidationError::invalid("time", s))
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ValidationError::invalid("date", s))
}

pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn urgency_multipliers() {
        assert_eq!(Urgency::Regular.multiplier(), 1);
        assert_eq!(Urgency::Important.multiplier(), 2);
        assert_eq!(Urgency::Urgent.multiplier(), 3);
    }

    #[test]
    fn loads_camel_case_blob_with_missing_optionals() {
        let raw = r#"{
            "id": "abc123",
            "title": "Gym",
            "date": "2026-03-01",
            "time": "07:30",
            "urgency": "Important",
            "category": "5x",
            "completionPercentage": 40,
            "notes": "",
            "isAlarmed": true,
            "isSnoozed": false,
            "isCompleted": false
        }"#;
        let t: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(t.category, Category::Accelerated);
        assert_eq!(t.urgency, Urgency::Important);
        assert_eq!(t.alarm_offset, AlarmOffset::OnTime);
        assert_eq!(t.repeat, Repeat::Once);
        assert_eq!(t.time, parse_hhmm("07:30").unwrap());
    }

    #[test]
    fn serializes_time_as_hhmm_and_offset_as_minutes() {
        let t = Task::new("x", "Read", d("2026-03-01"), parse_hhmm("09:05").unwrap())
            .with_alarm(AlarmOffset::ThirtyMinutes)
            .with_category(Category::Accelerated)
            .with_repeat(Repeat::Daily);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["time"], "09:05");
        assert_eq!(v["alarmOffset"], 30);
        assert_eq!(v["isAlarmed"], true);
        assert_eq!(v["category"], "5x");

        let back: Task = serde_json::from_value(v).unwrap();
        assert_eq!(back.repeat, Repeat::Daily);
        assert_eq!(back.category, Category::Accelerated);
    }

    #[test]
    fn rejects_unknown_offset() {
        assert!(AlarmOffset::try_from(15).is_err());
    }

    #[test]
    fn parses_spoken_levels() {
        assert_eq!("Priority".parse::<Urgency>().unwrap(), Urgency::Important);
        assert_eq!("super urgent".parse::<Urgency>().unwrap(), Urgency::Urgent);
        assert_eq!("5x speed".parse::<Category>().unwrap(), Category::Accelerated);
        assert!("whenever".parse::<Urgency>().is_err());
    }

    #[test]
    fn patch_completion_rules() {
        let mut t = Task::new("x", "Read", d("2026-03-01"), parse_hhmm("09:00").unwrap());
        TaskPatch::progress(100).apply(&mut t);
        assert!(t.is_completed);

        TaskPatch::progress(60).apply(&mut t);
        assert!(!t.is_completed);

        TaskPatch {
            is_completed: Some(true),
            ..TaskPatch::default()
        }
        .apply(&mut t);
        assert_eq!(t.completion_percentage, 100);
    }

    #[test]
    fn progress_is_clamped() {
        let t = Task::new("x", "Read", d("2026-03-01"), parse_hhmm("09:00").unwrap()).with_completion(180);
        assert_eq!(t.completion_percentage, 100);
        assert!(t.is_completed);
    }
}
