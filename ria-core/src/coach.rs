//! Prompt building and reply handling for the text-generation collaborator
//! (coaching advice and the daily roadmap).
//!
//! The model itself is remote and opaque. This module only decides what we
//! send, how we render what comes back, and what to show when it fails.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::ValidationError;
use crate::scoring::DailyReport;
use crate::task::{Category, Task, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Hindi,
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "hindi" | "hi" => Ok(Language::Hindi),
            _ => Err(ValidationError::invalid("language", s)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => f.write_str("English"),
            Language::Hindi => f.write_str("Hindi"),
        }
    }
}

impl Language {
    /// Shown when advice can't be fetched.
    pub fn advice_fallback(self) -> &'static str {
        match self {
            Language::English => "Connection lost. Re-link required.",
            Language::Hindi => "कनेक्शन खो गया। पुनः लिंक करें।",
        }
    }

    /// Shown when the roadmap can't be generated.
    pub fn roadmap_fallback(self) -> &'static str {
        match self {
            Language::English => "Schedule sync failed. Try again.",
            Language::Hindi => "सिंक विफल। पुनः प्रयास करें।",
        }
    }
}

/// A grounding source returned alongside generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiReply {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl AiReply {
    /// Text followed by a numbered source list (deduplicated by uri).
    pub fn render(&self) -> String {
        let mut out = self.text.trim().to_string();
        let mut seen: Vec<&str> = Vec::new();
        for c in &self.citations {
            if seen.contains(&c.uri.as_str()) {
                continue;
            }
            if seen.is_empty() {
                out.push_str("\n\nSources:");
            }
            seen.push(&c.uri);
            let title = if c.title.trim().is_empty() { &c.uri } else { &c.title };
            out.push_str(&format!("\n{}. {} <{}>", seen.len(), title, c.uri));
        }
        out
    }
}

/// Reply text, or the localized fallback when the call failed or came back empty.
pub fn text_or_fallback<E: fmt::Display>(result: Result<AiReply, E>, fallback: &str) -> String {
    match result {
        Ok(reply) if !reply.text.trim().is_empty() => reply.render(),
        Ok(_) => fallback.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "AI request failed, using fallback");
            fallback.to_string()
        }
    }
}

/// What the model sees of a mission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskSnapshot<'a> {
    title: &'a str,
    date: NaiveDate,
    time: String,
    category: Category,
    urgency: Urgency,
    completion_percentage: u8,
    is_completed: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    interim_notes: &'a str,
}

fn snapshot(tasks: &[Task]) -> String {
    let snaps: Vec<TaskSnapshot<'_>> = tasks
        .iter()
        .map(|t| TaskSnapshot {
            title: &t.title,
            date: t.date,
            time: t.time.format("%H:%M").to_string(),
            category: t.category,
            urgency: t.urgency,
            completion_percentage: t.completion_percentage,
            is_completed: t.is_completed,
            interim_notes: &t.interim_notes,
        })
        .collect();
    serde_json::to_string(&snaps).unwrap_or_else(|_| "[]".to_string())
}

pub fn advice_prompt(tasks: &[Task], reports: &[DailyReport], history: &[String], lang: Language) -> String {
    let mut p = String::new();
    p.push_str("You are Ria, a concise productivity coach.\n");
    p.push_str(&format!("Missions: {}\n", snapshot(tasks)));
    if !reports.is_empty() {
        let recent = &reports[reports.len().saturating_sub(7)..];
        p.push_str(&format!(
            "Recent daily reports: {}\n",
            serde_json::to_string(recent).unwrap_or_default()
        ));
    }
    if !history.is_empty() {
        p.push_str("Recent conversation:\n");
        for line in history {
            p.push_str(line);
            p.push('\n');
        }
    }
    p.push_str("Give 3 actionable insights, one short paragraph each.\n");
    p.push_str(&format!("Respond in {lang}."));
    p
}

pub fn roadmap_prompt(tasks: &[Task], now: NaiveDateTime, lang: Language) -> String {
    format!(
        "Current time: {}. Missions: {}.\n\
         Build today's schedule from the current time onwards.\n\
         One line per block, exactly: [HH:MM] >> [MISSION] || [TACTIC]. No intro.\n\
         Respond in {lang}.",
        now.format("%Y-%m-%d %H:%M"),
        snapshot(tasks),
    )
}

/// One block of the generated day plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapEntry {
    #[serde(with = "crate::task::hhmm")]
    pub time: NaiveTime,
    pub mission: String,
    pub tactic: String,
}

static ROADMAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[?(\d{1,2}:\d{2})\]?\s*>>\s*\[?([^|\]]+?)\]?\s*\|\|\s*\[?(.+?)\]?\s*$")
        .expect("valid roadmap regex")
});

/// Pull `[HH:MM] >> [MISSION] || [TACTIC]` lines out of a roadmap reply.
/// Chatter around them is ignored, entries come back time-ordered.
pub fn parse_roadmap(text: &str) -> Vec<RoadmapEntry> {
    let mut entries: Vec<RoadmapEntry> = text
        .lines()
        .filter_map(|line| {
            let caps = ROADMAP_RE.captures(line)?;
            let time = crate::task::parse_hhmm(&caps[1]).ok()?;
            Some(RoadmapEntry {
                time,
                mission: caps[2].trim().to_string(),
                tactic: caps[3].trim().to_string(),
            })
        })
        .collect();
    entries.sort_by_key(|e| e.time);
    entries
}

/// System instruction for the assistant session that fills the entry form.
pub fn assistant_instruction(today: NaiveDate, lang: Language) -> String {
    format!(
        "You are Ria, a mission entry assistant. Today is {today}.\n\
         Ask for one detail at a time: objective, date and time, category \
         (routine or 5x), priority (Regular, Important, Urgent), alarm (yes/no or \
         10/30 minutes before). After each answer call update_task_field. \
         When everything is set call launch_mission, then ask whether to add another.\n\
         Speak {lang}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{parse_date, parse_hhmm};

    #[test]
    fn render_lists_unique_sources() {
        let reply = AiReply {
            text: "Batch your calls.\n".into(),
            citations: vec![
                Citation {
                    uri: "https://a.example".into(),
                    title: "A".into(),
                },
                Citation {
                    uri: "https://a.example".into(),
                    title: "A again".into(),
                },
                Citation {
                    uri: "https://b.example".into(),
                    title: "".into(),
                },
            ],
        };
        assert_eq!(
            reply.render(),
            "Batch your calls.\n\nSources:\n1. A <https://a.example>\n2. https://b.example <https://b.example>"
        );
    }

    #[test]
    fn failures_and_empty_replies_fall_back() {
        let lang = Language::Hindi;
        let failed: Result<AiReply, String> = Err("timeout".into());
        assert_eq!(text_or_fallback(failed, lang.advice_fallback()), lang.advice_fallback());

        let empty: Result<AiReply, String> = Ok(AiReply::default());
        assert_eq!(text_or_fallback(empty, lang.roadmap_fallback()), lang.roadmap_fallback());
    }

    #[test]
    fn prompts_carry_tasks_and_language() {
        let t = Task::new("x", "Deep work", parse_date("2026-03-02").unwrap(), parse_hhmm("10:00").unwrap());
        let now = parse_date("2026-03-02").unwrap().and_hms_opt(8, 30, 0).unwrap();
        let p = roadmap_prompt(std::slice::from_ref(&t), now, Language::Hindi);
        assert!(p.contains("Deep work"));
        assert!(p.contains("2026-03-02 08:30"));
        assert!(p.ends_with("Respond in Hindi."));

        let a = advice_prompt(&[t], &[], &["Ria: hi".into()], Language::English);
        assert!(a.contains("Ria: hi"));
        assert!(!a.contains("Recent daily reports"));
    }

    #[test]
    fn roadmap_lines_are_parsed_and_noise_skipped() {
        let text = "Here is your plan:\n\
                    [14:00] >> [Gym] || [Short rests]\n\
                    [09:30] >> Deep work || Phone in another room\n\
                    [25:00] >> [Nope] || [x]\n";
        let plan = parse_roadmap(text);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].time, parse_hhmm("09:30").unwrap());
        assert_eq!(plan[0].mission, "Deep work");
        assert_eq!(plan[1].mission, "Gym");
        assert_eq!(plan[1].tactic, "Short rests");
    }

    #[test]
    fn language_round_trip() {
        assert_eq!("hindi".parse::<Language>().unwrap(), Language::Hindi);
        assert_eq!(Language::English.to_string(), "English");
        assert!("klingon".parse::<Language>().is_err());
    }
}
