//! `ria assist`: conversational mission entry.
//!
//! Typed lines go to the assistant; its tool calls fill the entry form and
//! save missions. There is no audio backend, so the session runs
//! transcript-only.

use anyhow::Result;
use ria_core::coach::assistant_instruction;
use ria_core::session::{AudioDevice, SessionOutcome, VoiceSession};
use ria_core::{EntryForm, MemoryBank, SessionError};
use std::io::{self, BufRead, Write};

use crate::config::Config;
use crate::gemini::{GeminiClient, GeminiTransport};
use crate::state;
use crate::tasks_cmd::format_row;

#[derive(Debug, Default)]
pub struct TerminalAudio {
    acquired: bool,
}

impl AudioDevice for TerminalAudio {
    fn acquire(&mut self) -> Result<(), SessionError> {
        tracing::info!("no audio backend, running transcript-only");
        self.acquired = true;
        Ok(())
    }

    fn play(&mut self, _pcm: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.acquired = false;
    }
}

fn read_line(label: &str) -> Result<Option<String>> {
    print!("{label}> ");
    io::stdout().flush().ok();
    let mut s = String::new();
    if io::stdin().lock().read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim().to_string()))
}

pub fn render(outcome: &SessionOutcome) -> Option<String> {
    match outcome {
        SessionOutcome::Said(text) => Some(format!("ria> {}", text.trim())),
        SessionOutcome::FieldSet { field, value } => Some(format!("  {field} = {value}")),
        SessionOutcome::Saved(t) => Some(format!("  saved: {}", format_row(t))),
        SessionOutcome::Rejected(reason) => Some(format!("  ! {reason}")),
        SessionOutcome::Interrupted(reason) => Some(format!("  ! connection lost, turn dropped: {reason}")),
        SessionOutcome::Heard(_) | SessionOutcome::TurnComplete => None,
    }
}

pub fn run_assist(cfg: &Config) -> Result<()> {
    let mut store = state::open_store()?;
    let lang = state::language(store.storage(), cfg.general.language);
    let client = GeminiClient::from_config(&cfg.ai)?;
    let memory = MemoryBank::load(store.storage());

    let mut form = EntryForm::new();
    let mut session = VoiceSession::new(GeminiTransport::new(client), TerminalAudio::default(), memory);
    let today = cfg.local_now()?.date();
    session.open(&mut form, &assistant_instruction(today, lang))?;

    println!("Tell Ria about a mission. 'quit' to leave.\n");

    while let Some(line) = read_line("you")? {
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "bye") {
            break;
        }

        let now = cfg.local_now()?;
        match session.send_text(&line, &mut form, &mut store, now) {
            Ok(outcomes) => {
                for line in outcomes.iter().filter_map(render) {
                    println!("{line}");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "assistant turn failed");
                println!("ria> {}", lang.advice_fallback());
            }
        }
    }

    if !form.draft().title.is_empty() {
        println!("Unsaved draft discarded.");
    }
    session.close(&mut form);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ria_core::FormField;

    #[test]
    fn terminal_audio_tracks_acquisition() {
        let mut audio = TerminalAudio::default();
        audio.acquire().unwrap();
        assert!(audio.acquired);
        assert!(audio.play(&[1, 2, 3]).is_ok());
        audio.release();
        assert!(!audio.acquired);
    }

    #[test]
    fn renders_only_visible_outcomes() {
        assert_eq!(
            render(&SessionOutcome::FieldSet {
                field: FormField::Time,
                value: "7pm".into()
            })
            .as_deref(),
            Some("  time = 7pm")
        );
        assert_eq!(render(&SessionOutcome::Said(" Done. ".into())).as_deref(), Some("ria> Done."));
        assert!(render(&SessionOutcome::TurnComplete).is_none());
        assert!(render(&SessionOutcome::Heard("x".into())).is_none());
        assert!(
            render(&SessionOutcome::Interrupted("reset".into()))
                .is_some_and(|l| l.contains("turn dropped"))
        );
    }
}
