//! Ledger subcommands: add / list / show / update / done / delete / restore,
//! scoring, daily reports, CSV export.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use clap::Args;
use ria_core::form::{EntryForm, FormField};
use ria_core::scoring::{DailyReport, ScoreConfig, daily_efficiency, upsert_report};
use ria_core::{FileStore, KeyValueStore, Repeat, Task, TaskPatch, TaskStore};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::setup::prompt;
use crate::state;

#[derive(Args, Debug, Default)]
pub struct FieldArgs {
    /// today, tomorrow, day after tomorrow, or YYYY-MM-DD
    #[arg(long)]
    pub date: Option<String>,

    /// 24h HH:MM or spoken (7pm, 7:30 am)
    #[arg(long)]
    pub time: Option<String>,

    /// routine | 5x
    #[arg(long)]
    pub category: Option<String>,

    /// Regular | Important | Urgent
    #[arg(long)]
    pub priority: Option<String>,

    /// yes | no | 10 | 30 (minutes before)
    #[arg(long)]
    pub alarm: Option<String>,

    /// Repeat every day
    #[arg(long)]
    pub daily: bool,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Objective (prompted for when omitted)
    pub title: Vec<String>,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Mission id (a unique prefix is enough)
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub fields: FieldArgs,

    /// Progress 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub progress: Option<u8>,

    /// Progress log for a mission under way
    #[arg(long)]
    pub interim: Option<String>,

    /// Stop repeating daily
    #[arg(long, conflicts_with = "daily")]
    pub once: bool,
}

fn apply_fields(form: &mut EntryForm, fields: &FieldArgs, today: NaiveDate) -> Result<()> {
    let pairs = [
        (FormField::Date, &fields.date),
        (FormField::Time, &fields.time),
        (FormField::Category, &fields.category),
        (FormField::Priority, &fields.priority),
        (FormField::Alarm, &fields.alarm),
    ];
    for (field, value) in pairs {
        if let Some(v) = value {
            form.set_manual(field, v, today)
                .with_context(|| format!("--{field}"))?;
        }
    }
    form.edit_manual(|d| {
        if fields.daily {
            d.repeat = Repeat::Daily;
        }
        if let Some(n) = &fields.notes {
            d.notes = n.clone();
        }
    })?;
    Ok(())
}

/// Resolve a full id or unique prefix.
pub fn resolve_id<K: KeyValueStore>(store: &TaskStore<K>, needle: &str) -> Result<String> {
    let needle = needle.trim();
    if store.get(needle).is_some() {
        return Ok(needle.to_string());
    }
    let hits: Vec<&Task> = store.tasks().iter().filter(|t| t.id.starts_with(needle)).collect();
    match hits.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => bail!("no mission with id '{needle}'"),
        many => bail!("'{needle}' matches {} missions, use a longer prefix", many.len()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Scheduled local time plus the UTC instant it maps to in `tz`.
fn when_line(t: &Task, tz: Tz) -> String {
    let local = t.scheduled_at();
    let utc = match ria_core::time::local_to_utc(local, tz) {
        Some(utc) => utc.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => format!("skipped by a clock change in {tz}"),
    };
    format!("{} {} ({utc})", t.date, t.time.format("%H:%M"))
}

pub fn format_row(t: &Task) -> String {
    let mut flags = String::new();
    if t.is_alarmed {
        flags.push_str(" alarm");
        if t.alarm_offset.minutes() > 0 {
            flags.push_str(&format!("-{}m", t.alarm_offset.minutes()));
        }
    }
    if t.is_snoozed {
        flags.push_str(" snoozed");
    }
    if t.repeat == Repeat::Daily {
        flags.push_str(" daily");
    }
    format!(
        "{}  {} {}  {:<9} {:<7} {:>3}%  {}{}{}",
        short_id(&t.id),
        t.date,
        t.time.format("%H:%M"),
        t.urgency.to_string(),
        t.category.to_string(),
        t.completion_percentage,
        if t.is_completed { "[done] " } else { "" },
        t.title,
        flags
    )
}

pub fn add(args: AddArgs, cfg: &Config) -> Result<()> {
    let now = cfg.local_now()?;
    let mut store = state::open_store()?;
    let saved = add_to(&mut store, args, now)?;
    println!("Added {}", format_row(&saved));
    Ok(())
}

fn add_to(store: &mut TaskStore<FileStore>, args: AddArgs, now: NaiveDateTime) -> Result<Task> {
    let mut form = EntryForm::new();
    form.begin_manual()?;
    apply_fields(&mut form, &args.fields, now.date())?;

    let mut title = args.title.join(" ");
    loop {
        if !title.trim().is_empty() {
            form.set_manual(FormField::Objective, &title, now.date())?;
            break;
        }
        // objective is required; keep asking
        title = prompt("Objective")?;
    }

    Ok(form.submit(store, now)?)
}

pub fn list(date: Option<String>, today_only: bool, cfg: &Config) -> Result<()> {
    let now = cfg.local_now()?;
    let store = state::open_store()?;

    let filter = match (date, today_only) {
        (Some(d), _) => Some(ria_core::form::parse_spoken_date(&d, now.date())?),
        (None, true) => Some(now.date()),
        (None, false) => None,
    };

    let rows: Vec<&Task> = store
        .sorted_by_date_desc()
        .into_iter()
        .filter(|t| filter.is_none_or(|d| t.date == d))
        .collect();

    if rows.is_empty() {
        println!("No missions.");
        return Ok(());
    }
    for t in rows {
        println!("{}", format_row(t));
    }
    Ok(())
}

pub fn show(id: &str, cfg: &Config) -> Result<()> {
    let tz = cfg.timezone()?;
    let store = state::open_store()?;
    let id = resolve_id(&store, id)?;
    let t = store.get(&id).context("mission vanished")?;

    println!("{}", t.title);
    println!("  id:        {}", t.id);
    println!("  when:      {}", when_line(t, tz));
    println!("  category:  {}", t.category);
    println!("  priority:  {} (x{})", t.urgency, t.urgency.multiplier());
    println!("  progress:  {}%{}", t.completion_percentage, if t.is_completed { " (done)" } else { "" });
    println!(
        "  alarm:     {}",
        if t.is_alarmed {
            format!("on, {} min before", t.alarm_offset.minutes())
        } else {
            "off".to_string()
        }
    );
    println!("  repeat:    {:?}", t.repeat);
    if let Some(d) = &t.description {
        println!("  about:     {d}");
    }
    if !t.notes.is_empty() {
        println!("  notes:     {}", t.notes);
    }
    if !t.interim_notes.is_empty() {
        println!("  log:       {}", t.interim_notes);
    }
    for s in &t.subtasks {
        println!("  [{}] {}", if s.is_completed { "x" } else { " " }, s.title);
    }
    Ok(())
}

pub fn update(args: UpdateArgs, cfg: &Config) -> Result<()> {
    let now = cfg.local_now()?;
    let mut store = state::open_store()?;
    let id = resolve_id(&store, &args.id)?;
    let current = store.get(&id).cloned().context("mission vanished")?;

    let mut form = EntryForm::new();
    form.begin_edit(&current)?;
    apply_fields(&mut form, &args.fields, now.date())?;
    if let Some(title) = &args.title {
        form.set_manual(FormField::Objective, title, now.date())?;
    }
    if args.once {
        form.edit_manual(|d| d.repeat = Repeat::Once)?;
    }
    let mut saved = form.submit(&mut store, now)?;

    let extra = TaskPatch {
        completion_percentage: args.progress,
        interim_notes: args.interim,
        ..TaskPatch::default()
    };
    if !extra.is_empty() {
        saved = store.update(&id, extra).context("mission vanished")?;
    }

    println!("Updated {}", format_row(&saved));
    Ok(())
}

pub fn done(id: &str) -> Result<()> {
    let mut store = state::open_store()?;
    let id = resolve_id(&store, id)?;
    let t = store.update(&id, TaskPatch::progress(100)).context("mission vanished")?;
    println!("Completed {}", t.title);
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    let mut store = state::open_store()?;
    let id = resolve_id(&store, id)?;
    let t = store.delete(&id).context("mission vanished")?;
    println!("Deleted {} (undo: ria restore)", t.title);
    Ok(())
}

pub fn restore() -> Result<()> {
    let mut store = state::open_store()?;
    match store.restore() {
        Some(t) => println!("Restored {}", format_row(&t)),
        None => println!("Nothing to restore."),
    }
    Ok(())
}

pub fn score(date: Option<String>, cfg: &Config) -> Result<()> {
    let now = cfg.local_now()?;
    let day = match date {
        Some(d) => ria_core::form::parse_spoken_date(&d, now.date())?,
        None => now.date(),
    };
    let store = state::open_store()?;
    let eff = daily_efficiency(store.tasks(), day, &ScoreConfig::default());
    let day_tasks = store.for_date(day);

    println!("Efficiency {}: {}%", day, eff.percentage);
    println!("Score: {} / {}", eff.display_score(), eff.max);
    println!(
        "Missions: {} done of {}",
        day_tasks.iter().filter(|t| t.is_completed).count(),
        day_tasks.len()
    );
    Ok(())
}

pub fn report_save(date: Option<String>, cfg: &Config) -> Result<()> {
    let now = cfg.local_now()?;
    let day = match date {
        Some(d) => ria_core::form::parse_spoken_date(&d, now.date())?,
        None => now.date(),
    };
    let mut store = state::open_store()?;
    let report = DailyReport::for_date(store.tasks(), day, &ScoreConfig::default());
    let mut book = state::read_reports(store.storage());
    println!(
        "Saved report {}: {}% ({}/{} missions)",
        report.date, report.efficiency, report.completed, report.total
    );
    upsert_report(&mut book, report);
    state::write_reports(store.storage_mut(), &book)
}

pub fn report_list() -> Result<()> {
    let store = state::open_store()?;
    let book = state::read_reports(store.storage());
    if book.is_empty() {
        println!("No reports yet (ria report save).");
        return Ok(());
    }
    for r in book.iter().rev() {
        println!(
            "{}  {:>3}%  {}/{} missions  score {:.1}/{:.1}",
            r.date, r.efficiency, r.completed, r.total, r.current_score, r.max_score
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    date: NaiveDate,
    time: String,
    title: &'a str,
    category: String,
    priority: String,
    progress: u8,
    completed: bool,
    alarm: bool,
    alarm_offset: u32,
    repeat: String,
    notes: &'a str,
}

pub fn export_csv(path: &Path) -> Result<()> {
    let store = state::open_store()?;
    let n = write_csv(store.tasks(), path)?;
    println!("Exported {} missions to {}", n, path.display());
    Ok(())
}

fn write_csv(tasks: &[Task], path: &Path) -> Result<usize> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for t in tasks {
        w.serialize(CsvRow {
            id: &t.id,
            date: t.date,
            time: t.time.format("%H:%M").to_string(),
            title: &t.title,
            category: t.category.to_string(),
            priority: t.urgency.to_string(),
            progress: t.completion_percentage,
            completed: t.is_completed,
            alarm: t.is_alarmed,
            alarm_offset: t.alarm_offset.minutes(),
            repeat: format!("{:?}", t.repeat).to_lowercase(),
            notes: &t.notes,
        })?;
    }
    w.flush()?;
    Ok(tasks.len())
}
