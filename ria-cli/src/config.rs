use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use ria_core::AlarmPolicy;
use ria_core::coach::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_ria_home;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSection,
    pub ai: AiSection,
    pub alarm: AlarmSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    /// IANA zone the mission times are written in.
    pub timezone: String,
    /// Used until a language is chosen with `ria lang`.
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    /// Attach web search grounding to advice requests.
    pub grounding: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSection {
    pub poll_interval_secs: u64,
    pub window_secs: i64,
    pub ring_interval_ms: u64,
    pub snooze_minutes: u32,
    /// Offered in the prompt while ringing.
    pub snooze_presets: Vec<u32>,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            timezone: "Asia/Kolkata".to_string(),
            language: Language::English,
        }
    }
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.7,
            grounding: true,
        }
    }
}

impl Default for AlarmSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            window_secs: 60,
            ring_interval_ms: 1200,
            snooze_minutes: 5,
            snooze_presets: vec![5, 10, 15],
        }
    }
}

impl AlarmSection {
    pub fn policy(&self) -> AlarmPolicy {
        AlarmPolicy {
            window: chrono::Duration::seconds(self.window_secs.max(1)),
            ring_interval: std::time::Duration::from_millis(self.ring_interval_ms.max(100)),
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        Ok(ria_core::time::parse_timezone(&self.general.timezone)?)
    }

    /// Wall clock the monitor and "today" defaults use.
    pub fn local_now(&self) -> Result<NaiveDateTime> {
        Ok(ria_core::time::local_now(self.timezone()?))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_ria_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    save_config_to(cfg, &config_path()?)
}

pub fn save_config_to(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config_to(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let p = config_path()?;
    let cfg = load_config_from(&p)?;
    println!("# {}", p.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[general]\ntimezone = \"Europe/Berlin\"\n\n[alarm]\nsnooze_minutes = 10\n").unwrap();

        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.general.timezone, "Europe/Berlin");
        assert_eq!(cfg.general.language, Language::English);
        assert_eq!(cfg.alarm.snooze_minutes, 10);
        assert_eq!(cfg.alarm.ring_interval_ms, 1200);
        assert_eq!(cfg.ai.model, "gemini-2.5-flash");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.general.language = Language::Hindi;
        save_config_to(&cfg, &p).unwrap();
        assert_eq!(load_config_from(&p).unwrap(), cfg);
    }

    #[test]
    fn alarm_policy_from_section() {
        let policy = AlarmSection::default().policy();
        assert_eq!(policy, AlarmPolicy::default());
    }

    #[test]
    fn bad_timezone_is_an_error() {
        let mut cfg = Config::default();
        cfg.general.timezone = "Nowhere/Else".into();
        assert!(cfg.local_now().is_err());
    }
}
