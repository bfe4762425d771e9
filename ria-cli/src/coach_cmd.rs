use anyhow::Result;
use ria_core::coach::{AiReply, Language, advice_prompt, parse_roadmap, roadmap_prompt, text_or_fallback};
use ria_core::storage::{AI_ADVICE_KEY, DAY_PLAN_KEY, set_or_clear};
use ria_core::{KeyValueStore, MemoryBank, Task};

use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::state;

async fn ask(cfg: &Config, prompt: &str, grounding: bool) -> Result<AiReply> {
    let client = GeminiClient::from_config(&cfg.ai)?;
    client.generate(prompt, grounding).await
}

/// Persist only real answers; fallbacks are not worth caching.
fn remember(kv: &mut dyn KeyValueStore, key: &str, text: &str, fallback: &str) {
    if text == fallback {
        return;
    }
    if let Err(e) = set_or_clear(kv, key, text) {
        tracing::warn!(key, error = %e, "failed to cache AI output");
    }
}

pub async fn advice(cfg: &Config, cached: bool) -> Result<()> {
    let mut store = state::open_store()?;
    let lang = state::language(store.storage(), cfg.general.language);

    if cached {
        print_cached(store.storage(), AI_ADVICE_KEY, lang);
        return Ok(());
    }

    let reports = state::read_reports(store.storage());
    let memory = MemoryBank::load(store.storage());
    let prompt = advice_prompt(store.tasks(), &reports, memory.lines(), lang);

    let fallback = lang.advice_fallback();
    let text = text_or_fallback(ask(cfg, &prompt, cfg.ai.grounding).await, fallback);
    remember(store.storage_mut(), AI_ADVICE_KEY, &text, fallback);

    println!("{text}");
    Ok(())
}

pub async fn roadmap(cfg: &Config, cached: bool) -> Result<()> {
    let mut store = state::open_store()?;
    let lang = state::language(store.storage(), cfg.general.language);

    if cached {
        print_cached(store.storage(), DAY_PLAN_KEY, lang);
        return Ok(());
    }

    let now = cfg.local_now()?;
    let open: Vec<Task> = store.active_for_date(now.date()).into_iter().cloned().collect();
    let prompt = roadmap_prompt(&open, now, lang);

    let fallback = lang.roadmap_fallback();
    let text = text_or_fallback(ask(cfg, &prompt, false).await, fallback);
    remember(store.storage_mut(), DAY_PLAN_KEY, &text, fallback);

    print_plan(&text);
    Ok(())
}

fn print_cached(kv: &dyn KeyValueStore, key: &str, lang: Language) {
    match kv.get(key) {
        Ok(Some(text)) if key == DAY_PLAN_KEY => print_plan(&text),
        Ok(Some(text)) => println!("{text}"),
        Ok(None) => println!("Nothing cached yet ({lang})."),
        Err(e) => println!("Could not read cache: {e}"),
    }
}

fn print_plan(text: &str) {
    let plan = parse_roadmap(text);
    if plan.is_empty() {
        println!("{text}");
        return;
    }
    for entry in plan {
        println!("{}  {}", entry.time.format("%H:%M"), entry.mission);
        println!("       -> {}", entry.tactic);
    }
}
