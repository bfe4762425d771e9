use anyhow::Result;
use ria_core::coach::Language;
use std::io::{self, Write};

use crate::config::{Config, config_path, load_config, save_config};
use crate::state;

pub fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

/// Ask until `parse` accepts the answer; blank keeps `current`.
fn prompt_parsed<T: std::fmt::Display>(
    label: &str,
    current: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    loop {
        let answer = prompt(&format!("{label} [{current}]"))?;
        if answer.is_empty() {
            return Ok(current);
        }
        match parse(&answer) {
            Some(v) => return Ok(v),
            None => println!("  '{answer}' not recognised, try again"),
        }
    }
}

pub fn run_setup() -> Result<()> {
    println!("Ria setup\n");
    let mut cfg: Config = load_config()?;

    cfg.general.timezone = prompt_parsed("Timezone (IANA)", cfg.general.timezone.clone(), |s| {
        ria_core::time::parse_timezone(s).ok().map(|_| s.to_string())
    })?;
    cfg.general.language = prompt_parsed("Language (English/Hindi)", cfg.general.language, |s| {
        s.parse::<Language>().ok()
    })?;
    cfg.alarm.snooze_minutes = prompt_parsed("Default snooze minutes", cfg.alarm.snooze_minutes, |s| {
        s.parse::<u32>().ok().filter(|m| *m > 0)
    })?;

    save_config(&cfg)?;
    let mut store = state::open_store()?;
    state::set_language(store.storage_mut(), cfg.general.language)?;

    println!("\nWrote:");
    println!("- {}", config_path()?.display());
    println!("- {}", state::store_dir()?.display());

    println!("\nNext recommended steps:");
    println!("- export {}=...   (enables advice, roadmap and assist)", cfg.ai.api_key_env);
    println!("- ria add \"Morning run\" --time 6:30am --alarm yes --daily");
    println!("- ria watch");

    Ok(())
}
