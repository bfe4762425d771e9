//! Daily efficiency score.
//!
//! Every mission on the day is worth `base_points * urgency multiplier`;
//! progress earns that share of it. The completion tier table is carried for
//! display but the daily score always uses the top tier as a flat base.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionTier {
    /// Lowest completion percentage in the tier (inclusive).
    pub min_pct: u8,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Descending by `min_pct`: 100, 75-99, 50-74, 25-49, 0-24.
    pub tiers: Vec<CompletionTier>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                CompletionTier { min_pct: 100, points: 10 },
                CompletionTier { min_pct: 75, points: 7 },
                CompletionTier { min_pct: 50, points: 5 },
                CompletionTier { min_pct: 25, points: 2 },
                CompletionTier { min_pct: 0, points: 0 },
            ],
        }
    }
}

impl ScoreConfig {
    /// Points of the tier containing `pct`.
    pub fn points_for(&self, pct: u8) -> u32 {
        self.tiers
            .iter()
            .find(|t| pct >= t.min_pct)
            .map(|t| t.points)
            .unwrap_or(0)
    }

    /// Flat per-mission base: the 100% tier.
    pub fn base_points(&self) -> u32 {
        self.points_for(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    pub current: f64,
    pub max: f64,
    /// 0-100, rounded.
    pub percentage: u32,
}

impl Efficiency {
    /// Whole scores print without decimals, others with one.
    pub fn display_score(&self) -> String {
        let score = (self.current * 10.0).round() / 10.0;
        if score.fract() == 0.0 {
            format!("{}", score as i64)
        } else {
            format!("{score:.1}")
        }
    }
}

pub fn efficiency<'a>(tasks: impl IntoIterator<Item = &'a Task>, config: &ScoreConfig) -> Efficiency {
    let base = f64::from(config.base_points());
    let mut current = 0.0;
    let mut max = 0.0;

    for t in tasks {
        let mult = f64::from(t.urgency.multiplier());
        current += f64::from(t.completion_percentage) / 100.0 * base * mult;
        max += base * mult;
    }

    let percentage = if max > 0.0 {
        (current / max * 100.0).round() as u32
    } else {
        0
    };

    Efficiency { current, max, percentage }
}

/// Efficiency over the missions scheduled on `date`.
pub fn daily_efficiency(tasks: &[Task], date: NaiveDate, config: &ScoreConfig) -> Efficiency {
    efficiency(tasks.iter().filter(|t| t.date == date), config)
}

/// End-of-day snapshot kept in the report book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub efficiency: u32,
    pub completed: usize,
    pub total: usize,
    pub current_score: f64,
    pub max_score: f64,
}

impl DailyReport {
    pub fn for_date(tasks: &[Task], date: NaiveDate, config: &ScoreConfig) -> Self {
        let eff = daily_efficiency(tasks, date, config);
        let day: Vec<&Task> = tasks.iter().filter(|t| t.date == date).collect();
        Self {
            date,
            efficiency: eff.percentage,
            completed: day.iter().filter(|t| t.is_completed).count(),
            total: day.len(),
            current_score: eff.current,
            max_score: eff.max,
        }
    }
}

/// Insert or replace the report for its date, keeping the book date-ordered.
pub fn upsert_report(book: &mut Vec<DailyReport>, report: DailyReport) {
    book.retain(|r| r.date != report.date);
    let idx = book.partition_point(|r| r.date < report.date);
    book.insert(idx, report);
}
