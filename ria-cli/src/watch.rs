//! `ria watch`: foreground alarm loop.
//!
//! Polls the ledger on a fixed interval, rings the active alarm on a shorter
//! cadence and reads `stop` / `snooze [min]` / `postpone [date] <time>` from
//! stdin. Other `ria` invocations may edit the ledger meanwhile, so every poll
//! and every resolution command starts from a fresh read of the disk.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ria_core::form::{parse_spoken_date, parse_spoken_time};
use ria_core::{AlarmMonitor, FileStore, Ringer, Task, TaskStore};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::Config;
use crate::state;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Stop,
    Snooze(u32),
    Postpone(NaiveDate, NaiveTime),
    Quit,
}

pub fn parse_command(line: &str, today: NaiveDate, default_snooze: u32) -> Result<WatchCommand> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((head, rest)) = words.split_first() else {
        bail!("empty command");
    };

    match head.to_lowercase().as_str() {
        "stop" | "s" => Ok(WatchCommand::Stop),
        "quit" | "q" | "exit" => Ok(WatchCommand::Quit),
        "snooze" | "z" => match rest.first() {
            None => Ok(WatchCommand::Snooze(default_snooze)),
            Some(m) => match m.parse::<u32>() {
                Ok(mins) if mins > 0 => Ok(WatchCommand::Snooze(mins)),
                _ => bail!("snooze takes a number of minutes, got '{m}'"),
            },
        },
        "postpone" | "p" => {
            // last word is the time, anything before it the date
            let Some((time, date_words)) = rest.split_last() else {
                bail!("usage: postpone [date] <time>");
            };
            let time = parse_spoken_time(time)?;
            let date = if date_words.is_empty() {
                today
            } else {
                parse_spoken_date(&date_words.join(" "), today)?
            };
            Ok(WatchCommand::Postpone(date, time))
        }
        other => bail!("unknown command '{other}' (stop, snooze [min], postpone [date] <time>, quit)"),
    }
}

/// Bell character plus a one-line banner.
pub struct TerminalBell<W: Write> {
    out: W,
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Ringer for TerminalBell<W> {
    fn ring(&mut self, task: &Task) -> std::io::Result<()> {
        write!(self.out, "\x07\r>> ALARM {} {}", task.time.format("%H:%M"), task.title)?;
        self.out.flush()
    }
}

fn announce(task: &Task, cfg: &Config) {
    println!("\n==============================");
    println!("  MISSION ALARM  [{}]", task.urgency);
    println!("  {}", task.title);
    println!("  scheduled {} {}", task.date, task.time.format("%H:%M"));
    println!("==============================");
    let presets: Vec<String> = cfg.alarm.snooze_presets.iter().map(|m| m.to_string()).collect();
    println!(
        "stop | snooze [{}] | postpone [date] <time>",
        if presets.is_empty() {
            cfg.alarm.snooze_minutes.to_string()
        } else {
            presets.join("/")
        }
    );
}

/// Ring cadence timer. Its select branch sits disabled while nothing rings,
/// so missed ticks must not pile up into a burst of bells.
fn ring_interval(period: Duration) -> Interval {
    let mut ring = tokio::time::interval(period);
    ring.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ring
}

/// Re-read the ledger from disk, picking up edits from other `ria` runs.
fn reload(store: &mut TaskStore<FileStore>) -> Result<()> {
    let fs = FileStore::open(store.storage().root()).context("reopening mission store")?;
    *store = TaskStore::load(fs);
    Ok(())
}

/// Apply a stop/snooze/postpone to the active alarm against the current disk
/// state. `None` when nothing is ringing or the mission has gone away.
fn resolve(
    monitor: &mut AlarmMonitor,
    store: &mut TaskStore<FileStore>,
    cmd: WatchCommand,
    now: NaiveDateTime,
) -> Result<Option<String>> {
    reload(store)?;
    let resolved = match cmd {
        WatchCommand::Quit => None,
        WatchCommand::Stop => monitor.stop(store, now).map(|t| format!("Stopped: {}", t.title)),
        WatchCommand::Snooze(mins) => monitor
            .snooze(store, mins, now)
            .map(|t| format!("Snoozed {} for {mins} min", t.title)),
        WatchCommand::Postpone(date, time) => monitor
            .postpone(store, date, time)
            .map(|t| format!("Moved {} to {} {}", t.title, t.date, t.time.format("%H:%M"))),
    };
    Ok(resolved)
}

pub async fn run_watch(cfg: &Config) -> Result<()> {
    let tz = cfg.timezone()?;
    let policy = cfg.alarm.policy();
    let mut monitor = AlarmMonitor::new(policy);
    let mut store = state::open_store()?;
    let mut bell = TerminalBell::new(std::io::stdout());

    let mut poll = tokio::time::interval(std::time::Duration::from_secs(cfg.alarm.poll_interval_secs.max(1)));
    let mut ring = ring_interval(policy.ring_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!(
        "Watching {} missions ({}). Ctrl-C to quit.",
        store.len(),
        cfg.general.timezone
    );

    loop {
        tokio::select! {
            _ = poll.tick() => {
                reload(&mut store)?;
                let now = ria_core::time::local_now(tz);
                if let Some(task) = monitor.poll(&mut store, now) {
                    announce(&task, cfg);
                    monitor.ring(&store, &mut bell);
                    ring.reset();
                }
            }
            _ = ring.tick(), if monitor.active_id().is_some() => {
                monitor.ring(&store, &mut bell);
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed, alarms can only be silenced with Ctrl-C");
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let now = ria_core::time::local_now(tz);
                let cmd = match parse_command(&line, now.date(), cfg.alarm.snooze_minutes) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                if cmd == WatchCommand::Quit {
                    break;
                }
                let resolved = resolve(&mut monitor, &mut store, cmd, now)?;
                println!("\n{}", resolved.unwrap_or_else(|| "No alarm is ringing.".to_string()));
            }
            _ = &mut ctrl_c => {
                println!();
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ria_core::task::{parse_date, parse_hhmm};
    use ria_core::{NewTask, TaskPatch};
    use tokio::time::timeout;

    fn today() -> NaiveDate {
        parse_date("2026-03-02").unwrap()
    }

    #[test]
    fn parses_resolution_commands() {
        assert_eq!(parse_command("stop", today(), 5).unwrap(), WatchCommand::Stop);
        assert_eq!(parse_command("snooze", today(), 5).unwrap(), WatchCommand::Snooze(5));
        assert_eq!(parse_command("z 10", today(), 5).unwrap(), WatchCommand::Snooze(10));
        assert_eq!(
            parse_command("postpone 18:30", today(), 5).unwrap(),
            WatchCommand::Postpone(today(), parse_hhmm("18:30").unwrap())
        );
        assert_eq!(
            parse_command("postpone tomorrow 7am", today(), 5).unwrap(),
            WatchCommand::Postpone(parse_date("2026-03-03").unwrap(), parse_hhmm("07:00").unwrap())
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("snooze 0", today(), 5).is_err());
        assert!(parse_command("postpone", today(), 5).is_err());
        assert!(parse_command("dance", today(), 5).is_err());
    }

    #[test]
    fn bell_writes_banner() {
        let task = Task::new("x", "Stretch", today(), parse_hhmm("08:50").unwrap());
        let mut bell = TerminalBell::new(Vec::new());
        bell.ring(&task).unwrap();
        let out = String::from_utf8(bell.out).unwrap();
        assert_eq!(out, "\x07\r>> ALARM 08:50 Stretch");
    }

    #[tokio::test]
    async fn idle_ring_timer_does_not_burst() {
        let period = Duration::from_millis(40);
        let mut ring = ring_interval(period);
        ring.tick().await;

        // branch disabled for many periods, as while no alarm is active
        tokio::time::sleep(period * 10).await;

        let mut ready = 0;
        while timeout(Duration::from_millis(5), ring.tick()).await.is_ok() {
            ready += 1;
            if ready > 3 {
                break;
            }
        }
        assert!(ready <= 1, "{ready} ticks fired back-to-back");
    }

    #[tokio::test]
    async fn new_alarm_restarts_cadence() {
        let period = Duration::from_millis(40);
        let mut ring = ring_interval(period);
        ring.tick().await;
        tokio::time::sleep(period * 5).await;

        ring.reset();
        assert!(timeout(Duration::from_millis(5), ring.tick()).await.is_err());
        assert!(timeout(period * 3, ring.tick()).await.is_ok());
    }

    fn at(time: &str) -> NaiveDateTime {
        today().and_time(parse_hhmm(time).unwrap())
    }

    fn open(dir: &tempfile::TempDir) -> TaskStore<FileStore> {
        TaskStore::load(FileStore::open(dir.path()).unwrap())
    }

    fn ringing_standup(dir: &tempfile::TempDir) -> (AlarmMonitor, TaskStore<FileStore>) {
        let mut store = open(dir);
        store
            .create(
                NewTask {
                    title: "Standup".into(),
                    time: Some(parse_hhmm("09:00").unwrap()),
                    is_alarmed: true,
                    ..NewTask::default()
                },
                at("08:00"),
            )
            .unwrap();
        let mut monitor = AlarmMonitor::default();
        assert!(monitor.poll(&mut store, at("09:00")).is_some());
        (monitor, store)
    }

    #[test]
    fn stop_keeps_missions_added_while_ringing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut monitor, mut store) = ringing_standup(&dir);

        let mut other = open(&dir);
        other.create(NewTask::titled("Added while ringing"), at("09:00")).unwrap();

        let msg = resolve(&mut monitor, &mut store, WatchCommand::Stop, at("09:00")).unwrap();
        assert_eq!(msg.as_deref(), Some("Stopped: Standup"));

        let disk = open(&dir);
        assert_eq!(disk.len(), 2);
        assert!(!disk.tasks()[0].is_alarmed);
        assert_eq!(disk.tasks()[1].title, "Added while ringing");
    }

    #[test]
    fn snooze_keeps_progress_logged_while_ringing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut monitor, mut store) = ringing_standup(&dir);
        let id = monitor.active_id().unwrap().to_string();

        let mut other = open(&dir);
        other.update(&id, TaskPatch::progress(50)).unwrap();

        resolve(&mut monitor, &mut store, WatchCommand::Snooze(5), at("09:00")).unwrap();

        let disk = open(&dir);
        let t = disk.get(&id).unwrap();
        assert!(t.is_snoozed);
        assert_eq!(t.completion_percentage, 50);
    }

    #[test]
    fn resolving_a_deleted_alarm_reports_nothing_ringing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut monitor, mut store) = ringing_standup(&dir);
        let id = monitor.active_id().unwrap().to_string();

        let mut other = open(&dir);
        other.delete(&id).unwrap();

        let msg = resolve(&mut monitor, &mut store, WatchCommand::Stop, at("09:00")).unwrap();
        assert!(msg.is_none());
        assert!(open(&dir).is_empty());
    }
}
