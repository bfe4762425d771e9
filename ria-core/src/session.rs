//! Assistant session: one explicit object that owns the remote transport and
//! the audio device for its lifetime and routes what the model says into the
//! entry form.
//!
//! Events are processed in arrival order. Replying to a function call can
//! produce further events; those are queued behind the ones already pending.

use chrono::NaiveDateTime;
use serde_json::{Value, json};
use std::collections::VecDeque;

use crate::error::SessionError;
use crate::form::{EntryForm, FormField, FormMode};
use crate::memory_bank::MemoryBank;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::Task;
use crate::tool_call::{ToolCall, function_declarations};

/// What the remote assistant sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transcript chunk of what the user said.
    InputTranscript(String),
    /// Transcript chunk of what the assistant said.
    OutputTranscript(String),
    /// Synthesized speech, raw PCM.
    Audio(Vec<u8>),
    FunctionCall { id: String, name: String, args: Value },
    TurnComplete,
}

/// Bidirectional link to the remote assistant.
pub trait AssistantTransport {
    fn connect(&mut self, instruction: &str, tools: &Value) -> Result<(), SessionError>;
    fn send_text(&mut self, text: &str) -> Result<Vec<SessionEvent>, SessionError>;
    fn send_audio(&mut self, pcm: &[u8]) -> Result<Vec<SessionEvent>, SessionError>;
    /// Answer a function call; the assistant may keep talking.
    fn respond(&mut self, call_id: &str, response: Value) -> Result<Vec<SessionEvent>, SessionError>;
    fn close(&mut self);
}

/// Microphone + speaker owned by the session while it is open.
pub trait AudioDevice {
    fn acquire(&mut self) -> Result<(), SessionError>;
    fn play(&mut self, pcm: &[u8]) -> std::io::Result<()>;
    fn release(&mut self);
}

/// Something the caller may want to show.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Heard(String),
    Said(String),
    FieldSet { field: FormField, value: String },
    Saved(Task),
    Rejected(String),
    /// The link failed mid-turn; the rest of the turn was dropped.
    Interrupted(String),
    TurnComplete,
}

pub struct VoiceSession<T: AssistantTransport, A: AudioDevice> {
    transport: T,
    audio: A,
    memory: MemoryBank,
    open: bool,
    heard: String,
    said: String,
}

impl<T: AssistantTransport, A: AudioDevice> VoiceSession<T, A> {
    pub fn new(transport: T, audio: A, memory: MemoryBank) -> Self {
        Self {
            transport,
            audio,
            memory,
            open: false,
            heard: String::new(),
            said: String::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    /// Put the form in voice mode, then take the device, then connect.
    /// Any failure undoes the earlier steps and leaves the form idle.
    pub fn open(&mut self, form: &mut EntryForm, instruction: &str) -> Result<(), SessionError> {
        if self.open {
            return Err(SessionError::AlreadyOpen);
        }
        form.begin_voice()?;

        if let Err(e) = self.audio.acquire() {
            tracing::warn!(error = %e, "audio device unavailable, session not started");
            form.end_voice();
            return Err(e);
        }

        if let Err(e) = self.transport.connect(instruction, &function_declarations()) {
            tracing::warn!(error = %e, "assistant connect failed");
            self.audio.release();
            form.end_voice();
            return Err(e);
        }

        self.open = true;
        tracing::info!("assistant session opened");
        Ok(())
    }

    pub fn send_text<K: KeyValueStore>(
        &mut self,
        text: &str,
        form: &mut EntryForm,
        store: &mut TaskStore<K>,
        now: NaiveDateTime,
    ) -> Result<Vec<SessionOutcome>, SessionError> {
        if !self.open {
            return Err(SessionError::NotOpen);
        }
        let events = self.transport.send_text(text)?;
        self.pump(events, form, store, now)
    }

    pub fn send_audio<K: KeyValueStore>(
        &mut self,
        pcm: &[u8],
        form: &mut EntryForm,
        store: &mut TaskStore<K>,
        now: NaiveDateTime,
    ) -> Result<Vec<SessionOutcome>, SessionError> {
        if !self.open {
            return Err(SessionError::NotOpen);
        }
        let events = self.transport.send_audio(pcm)?;
        self.pump(events, form, store, now)
    }

    fn pump<K: KeyValueStore>(
        &mut self,
        events: Vec<SessionEvent>,
        form: &mut EntryForm,
        store: &mut TaskStore<K>,
        now: NaiveDateTime,
    ) -> Result<Vec<SessionOutcome>, SessionError> {
        let mut queue: VecDeque<SessionEvent> = events.into();
        let mut out = Vec::new();

        while let Some(event) = queue.pop_front() {
            match event {
                SessionEvent::InputTranscript(chunk) => {
                    self.heard.push_str(&chunk);
                    out.push(SessionOutcome::Heard(chunk));
                }
                SessionEvent::OutputTranscript(chunk) => {
                    self.said.push_str(&chunk);
                    out.push(SessionOutcome::Said(chunk));
                }
                SessionEvent::Audio(pcm) => {
                    if let Err(e) = self.audio.play(&pcm) {
                        tracing::debug!(error = %e, "dropped assistant audio chunk");
                    }
                }
                SessionEvent::FunctionCall { id, name, args } => {
                    let (outcome, response) = apply_call(&name, &args, form, store, now);
                    out.push(outcome);
                    match self.transport.respond(&id, response) {
                        Ok(more) => queue.extend(more),
                        Err(e) => {
                            // earlier outcomes (a saved mission included) already happened
                            tracing::warn!(error = %e, call = %id, "assistant reply failed, turn abandoned");
                            self.heard.clear();
                            self.said.clear();
                            out.push(SessionOutcome::Interrupted(e.to_string()));
                            break;
                        }
                    }
                }
                SessionEvent::TurnComplete => {
                    let heard = std::mem::take(&mut self.heard);
                    let said = std::mem::take(&mut self.said);
                    if self.memory.push_turn(now.time(), &heard, &said) {
                        self.memory.save(store.storage_mut());
                    }
                    out.push(SessionOutcome::TurnComplete);
                }
            }
        }

        Ok(out)
    }

    /// Disconnect, release the device and return the form to idle.
    /// An unsaved draft is discarded.
    pub fn close(&mut self, form: &mut EntryForm) {
        if self.open {
            self.transport.close();
            self.audio.release();
            self.open = false;
            self.heard.clear();
            self.said.clear();
            tracing::info!("assistant session closed");
        }
        if *form.mode() == FormMode::VoiceDriven {
            form.end_voice();
        }
    }
}

impl<T: AssistantTransport, A: AudioDevice> Drop for VoiceSession<T, A> {
    fn drop(&mut self) {
        if self.open {
            self.transport.close();
            self.audio.release();
        }
    }
}

fn apply_call<K: KeyValueStore>(
    name: &str,
    args: &Value,
    form: &mut EntryForm,
    store: &mut TaskStore<K>,
    now: NaiveDateTime,
) -> (SessionOutcome, Value) {
    let call = match ToolCall::from_function_call(name, args) {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "rejected tool call");
            return (SessionOutcome::Rejected(e.to_string()), json!({ "error": e.to_string() }));
        }
    };

    match call {
        ToolCall::UpdateField { field, value } => match form.apply_voice_update(field, &value, now.date()) {
            Ok(()) => (
                SessionOutcome::FieldSet {
                    field,
                    value: value.clone(),
                },
                json!({ "result": "ok", "field": field.to_string(), "value": value }),
            ),
            Err(e) => (SessionOutcome::Rejected(e.to_string()), json!({ "error": e.to_string() })),
        },
        ToolCall::Commit => match form.commit_voice(store, now) {
            Ok(task) => {
                tracing::info!(id = %task.id, title = %task.title, "mission saved by assistant");
                let response = json!({ "result": "saved", "id": task.id });
                (SessionOutcome::Saved(task), response)
            }
            Err(e) => (SessionOutcome::Rejected(e.to_string()), json!({ "error": e.to_string() })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::task::{Urgency, parse_date};

    #[derive(Default)]
    struct ScriptedTransport {
        connected: bool,
        closed: bool,
        fail_connect: bool,
        /// `respond` errors once this many replies have been sent.
        fail_respond_after: Option<usize>,
        /// One batch per send/respond call, in order.
        script: VecDeque<Vec<SessionEvent>>,
        responses: Vec<(String, Value)>,
    }

    impl ScriptedTransport {
        fn next(&mut self) -> Vec<SessionEvent> {
            self.script.pop_front().unwrap_or_default()
        }
    }

    impl AssistantTransport for ScriptedTransport {
        fn connect(&mut self, _instruction: &str, _tools: &Value) -> Result<(), SessionError> {
            if self.fail_connect {
                return Err(SessionError::Transport("refused".into()));
            }
            self.connected = true;
            Ok(())
        }
        fn send_text(&mut self, _text: &str) -> Result<Vec<SessionEvent>, SessionError> {
            Ok(self.next())
        }
        fn send_audio(&mut self, _pcm: &[u8]) -> Result<Vec<SessionEvent>, SessionError> {
            Ok(self.next())
        }
        fn respond(&mut self, call_id: &str, response: Value) -> Result<Vec<SessionEvent>, SessionError> {
            if self.fail_respond_after == Some(self.responses.len()) {
                return Err(SessionError::Transport("connection reset".into()));
            }
            self.responses.push((call_id.to_string(), response));
            Ok(self.next())
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    struct FakeDevice {
        missing: bool,
        acquired: bool,
        played: usize,
    }

    impl AudioDevice for FakeDevice {
        fn acquire(&mut self) -> Result<(), SessionError> {
            if self.missing {
                return Err(SessionError::Device("no microphone".into()));
            }
            self.acquired = true;
            Ok(())
        }
        fn play(&mut self, _pcm: &[u8]) -> std::io::Result<()> {
            self.played += 1;
            Ok(())
        }
        fn release(&mut self) {
            self.acquired = false;
        }
    }

    fn call(id: &str, name: &str, args: Value) -> SessionEvent {
        SessionEvent::FunctionCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    fn now() -> NaiveDateTime {
        parse_date("2026-03-02").unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn device_failure_leaves_form_idle() {
        let mut form = EntryForm::new();
        let audio = FakeDevice {
            missing: true,
            ..Default::default()
        };
        let mut s = VoiceSession::new(ScriptedTransport::default(), audio, MemoryBank::default());

        assert!(matches!(s.open(&mut form, "hi"), Err(SessionError::Device(_))));
        assert_eq!(*form.mode(), FormMode::Idle);
        assert!(!s.is_open());
        assert!(!s.transport().connected);
    }

    #[test]
    fn connect_failure_releases_device() {
        let mut form = EntryForm::new();
        let transport = ScriptedTransport {
            fail_connect: true,
            ..Default::default()
        };
        let mut s = VoiceSession::new(transport, FakeDevice::default(), MemoryBank::default());

        assert!(s.open(&mut form, "hi").is_err());
        assert!(!s.audio().acquired);
        assert_eq!(*form.mode(), FormMode::Idle);
    }

    #[test]
    fn tool_calls_fill_and_save_a_mission() {
        let mut store = TaskStore::load(MemoryStore::new());
        let mut form = EntryForm::new();
        let mut transport = ScriptedTransport::default();
        transport.script = VecDeque::from(vec![
            vec![
                SessionEvent::InputTranscript("gym at seven pm, urgent".into()),
                call("1", "update_task_field", json!({"field": "objective", "value": "Gym"})),
                call("2", "update_task_field", json!({"field": "time", "value": "7pm"})),
                call("3", "update_task_field", json!({"field": "priority", "value": "Urgent"})),
                call("4", "launch_mission", json!({})),
            ],
            vec![],
            vec![],
            vec![],
            // reply to launch_mission
            vec![
                SessionEvent::OutputTranscript("Mission locked.".into()),
                SessionEvent::Audio(vec![0, 1]),
                SessionEvent::TurnComplete,
            ],
        ]);

        let mut s = VoiceSession::new(transport, FakeDevice::default(), MemoryBank::default());
        s.open(&mut form, "instr").unwrap();
        let out = s.send_text("gym", &mut form, &mut store, now()).unwrap();

        let saved: Vec<&Task> = out
            .iter()
            .filter_map(|o| match o {
                SessionOutcome::Saved(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Gym");
        assert_eq!(saved[0].urgency, Urgency::Urgent);
        assert_eq!(saved[0].time.format("%H:%M").to_string(), "19:00");
        assert_eq!(store.len(), 1);

        // still dictating, ready for another mission
        assert_eq!(*form.mode(), FormMode::VoiceDriven);
        assert!(form.draft().title.is_empty());

        assert_eq!(s.transport().responses.len(), 4);
        assert_eq!(s.transport().responses[3].1["result"], "saved");
        assert_eq!(s.audio().played, 1);
        assert_eq!(s.memory().lines().len(), 2);
        assert_eq!(s.memory().lines()[1], "Ria: Mission locked.");
    }

    #[test]
    fn bad_calls_are_reported_back_not_fatal() {
        let mut store = TaskStore::load(MemoryStore::new());
        let mut form = EntryForm::new();
        let mut transport = ScriptedTransport::default();
        transport.script = VecDeque::from(vec![vec![
            call("1", "format_disk", json!({})),
            call("2", "update_task_field", json!({"field": "time", "value": "soonish"})),
            call("3", "launch_mission", json!({})),
        ]]);

        let mut s = VoiceSession::new(transport, FakeDevice::default(), MemoryBank::default());
        s.open(&mut form, "instr").unwrap();
        let out = s.send_text("go", &mut form, &mut store, now()).unwrap();

        assert_eq!(out.iter().filter(|o| matches!(o, SessionOutcome::Rejected(_))).count(), 3);
        assert!(store.is_empty());
        assert!(s.transport().responses.iter().all(|(_, r)| r.get("error").is_some()));
        assert!(s.is_open());
    }

    #[test]
    fn close_releases_everything() {
        let mut form = EntryForm::new();
        let mut store = TaskStore::load(MemoryStore::new());
        let mut s = VoiceSession::new(ScriptedTransport::default(), FakeDevice::default(), MemoryBank::default());
        s.open(&mut form, "instr").unwrap();
        assert!(matches!(s.open(&mut form, "instr"), Err(SessionError::AlreadyOpen)));

        s.close(&mut form);
        assert!(s.transport().closed);
        assert!(!s.audio().acquired);
        assert_eq!(*form.mode(), FormMode::Idle);
        assert!(matches!(
            s.send_text("hello", &mut form, &mut store, now()),
            Err(SessionError::NotOpen)
        ));
    }

    #[test]
    fn manual_form_blocks_session() {
        let mut form = EntryForm::new();
        form.begin_manual().unwrap();
        let mut s = VoiceSession::new(ScriptedTransport::default(), FakeDevice::default(), MemoryBank::default());
        assert!(matches!(s.open(&mut form, "instr"), Err(SessionError::Form(_))));
        assert!(!s.audio().acquired);
    }

    #[test]
    fn reply_failure_keeps_saved_mission_and_drops_partial_turn() {
        let mut store = TaskStore::load(MemoryStore::new());
        let mut form = EntryForm::new();
        let transport = ScriptedTransport {
            fail_respond_after: Some(1),
            script: VecDeque::from(vec![
                vec![
                    SessionEvent::InputTranscript("read at nine".into()),
                    call("1", "update_task_field", json!({"field": "objective", "value": "Read"})),
                    call("2", "launch_mission", json!({})),
                    SessionEvent::OutputTranscript("never heard".into()),
                ],
                vec![],
                // next turn
                vec![
                    SessionEvent::InputTranscript("thanks".into()),
                    SessionEvent::OutputTranscript("Anytime.".into()),
                    SessionEvent::TurnComplete,
                ],
            ]),
            ..Default::default()
        };

        let mut s = VoiceSession::new(transport, FakeDevice::default(), MemoryBank::default());
        s.open(&mut form, "instr").unwrap();
        let out = s.send_text("read", &mut form, &mut store, now()).unwrap();

        assert!(out.iter().any(|o| matches!(o, SessionOutcome::Saved(t) if t.title == "Read")));
        assert!(matches!(out.last(), Some(SessionOutcome::Interrupted(_))));
        assert!(!out.iter().any(|o| matches!(o, SessionOutcome::Said(_))));
        assert_eq!(store.len(), 1);
        assert!(s.is_open());

        s.send_text("thanks", &mut form, &mut store, now()).unwrap();
        assert_eq!(s.memory().lines().len(), 2);
        assert!(s.memory().lines()[0].ends_with("User: thanks"));
        assert_eq!(s.memory().lines()[1], "Ria: Anytime.");
    }
}
