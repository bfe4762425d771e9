use anyhow::{Context, Result};
use ria_core::coach::Language;
use ria_core::scoring::DailyReport;
use ria_core::storage::{KeyValueStore, LANGUAGE_KEY, REPORTS_KEY, load_json, save_json};
use ria_core::{FileStore, TaskStore};
use std::fs;
use std::path::PathBuf;

pub fn ria_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RIA_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".ria"))
}

pub fn ensure_ria_home() -> Result<PathBuf> {
    let dir = ria_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_dir() -> Result<PathBuf> {
    Ok(ensure_ria_home()?.join("store"))
}

pub fn open_store() -> Result<TaskStore<FileStore>> {
    let dir = store_dir()?;
    let kv = FileStore::open(&dir).with_context(|| format!("open store at {}", dir.display()))?;
    Ok(TaskStore::load(kv))
}

/// Stored language choice, else the configured default.
pub fn language(kv: &dyn KeyValueStore, fallback: Language) -> Language {
    match kv.get(LANGUAGE_KEY) {
        Ok(Some(raw)) => raw.parse().unwrap_or(fallback),
        _ => fallback,
    }
}

pub fn set_language(kv: &mut dyn KeyValueStore, lang: Language) -> Result<()> {
    kv.set(LANGUAGE_KEY, &lang.to_string()).context("save language")?;
    Ok(())
}

pub fn read_reports(kv: &dyn KeyValueStore) -> Vec<DailyReport> {
    load_json(kv, REPORTS_KEY).unwrap_or_default()
}

pub fn write_reports(kv: &mut dyn KeyValueStore, reports: &[DailyReport]) -> Result<()> {
    save_json(kv, REPORTS_KEY, reports).context("save reports")?;
    Ok(())
}
