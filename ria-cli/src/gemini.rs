//! Gemini `generateContent` client: one-shot text (advice, roadmap) and a
//! turn-based assistant transport for `ria assist`.

use anyhow::{Context, Result, bail};
use ria_core::SessionError;
use ria_core::coach::{AiReply, Citation};
use ria_core::session::{AssistantTransport, SessionEvent};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::AiSection;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn from_config(ai: &AiSection) -> Result<Self> {
        let api_key = std::env::var(&ai.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} is not set", ai.api_key_env))?;
        Ok(Self {
            model: ai.model.clone(),
            base_url: ai.base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: ai.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Single prompt, optional search grounding.
    pub async fn generate(&self, prompt: &str, grounding: bool) -> Result<AiReply> {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        if grounding {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }
        let resp = self.post(&body).await?;
        Ok(resp.reply())
    }

    async fn post(&self, body: &Value) -> Result<GenerateResponse> {
        let client = reqwest::Client::new();
        let resp = client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .context("gemini request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("gemini error: {status} {txt}");
        }

        resp.json().await.context("parse gemini response")
    }
}

/// Drive an async call from sync code.
///
/// The CLI runs under `#[tokio::main]`, so a nested `block_on` would panic;
/// inside a runtime use `block_in_place`, otherwise spin up a runtime.
pub fn block_on<F: std::future::Future>(fut: F) -> Result<F::Output> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
    } else {
        let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
        Ok(rt.block_on(fut))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateResponse {
    fn parts(&self) -> &[Value] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    fn reply(&self) -> AiReply {
        let text: String = self.parts().iter().filter_map(|p| p["text"].as_str()).collect();

        let citations = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .filter_map(|ch| ch.web.as_ref())
                    .filter_map(|w| {
                        Some(Citation {
                            uri: w.uri.clone()?,
                            title: w.title.clone().unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        AiReply {
            text: text.trim().to_string(),
            citations,
        }
    }
}

/// Turn-based assistant over REST. Text only: each user line is one request,
/// function calls are answered in a follow-up request once all of a turn's
/// calls have a response.
pub struct GeminiTransport {
    client: GeminiClient,
    instruction: String,
    tools: Value,
    history: Vec<Value>,
    /// Unanswered calls of the current turn: (id, function name).
    pending: Vec<(String, String)>,
    responses: Vec<Value>,
    /// History length before the current user turn.
    turn_start: usize,
    next_call_id: u64,
    connected: bool,
}

impl GeminiTransport {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            instruction: String::new(),
            tools: Value::Null,
            history: Vec::new(),
            pending: Vec::new(),
            responses: Vec::new(),
            turn_start: 0,
            next_call_id: 0,
            connected: false,
        }
    }

    fn request_body(&self) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": self.instruction }] },
            "contents": self.history,
            "tools": [{ "functionDeclarations": self.tools }],
            "generationConfig": { "temperature": self.client.temperature },
        })
    }

    /// Send the history, record the model turn, translate its parts.
    fn exchange(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let body = self.request_body();
        let resp = match block_on(self.client.post(&body)).and_then(|r| r) {
            Ok(resp) => resp,
            Err(e) => {
                self.abandon_turn();
                return Err(SessionError::Transport(format!("{e:#}")));
            }
        };

        let parts = resp.parts().to_vec();
        self.history.push(json!({ "role": "model", "parts": parts }));
        Ok(self.translate(&parts))
    }

    /// Forget a turn that can no longer finish: its unanswered calls and
    /// everything it added to the history.
    fn abandon_turn(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(calls = self.pending.len(), "dropping unanswered function calls");
        }
        self.pending.clear();
        self.responses.clear();
        self.history.truncate(self.turn_start);
    }

    fn translate(&mut self, parts: &[Value]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                events.push(SessionEvent::OutputTranscript(text.to_string()));
            } else if let Some(call) = part.get("functionCall") {
                self.next_call_id += 1;
                let id = format!("call-{}", self.next_call_id);
                let name = call["name"].as_str().unwrap_or_default().to_string();
                self.pending.push((id.clone(), name.clone()));
                events.push(SessionEvent::FunctionCall {
                    id,
                    name,
                    args: call.get("args").cloned().unwrap_or(Value::Null),
                });
            }
        }
        if self.pending.is_empty() {
            events.push(SessionEvent::TurnComplete);
        }
        events
    }
}

impl AssistantTransport for GeminiTransport {
    fn connect(&mut self, instruction: &str, tools: &Value) -> Result<(), SessionError> {
        self.instruction = instruction.to_string();
        self.tools = tools.clone();
        self.history.clear();
        self.pending.clear();
        self.responses.clear();
        self.turn_start = 0;
        self.connected = true;
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.connected {
            return Err(SessionError::NotOpen);
        }
        if !self.pending.is_empty() {
            self.abandon_turn();
        }
        self.turn_start = self.history.len();
        self.history.push(json!({ "role": "user", "parts": [{ "text": text }] }));
        let mut events = vec![SessionEvent::InputTranscript(text.to_string())];
        events.extend(self.exchange()?);
        Ok(events)
    }

    fn send_audio(&mut self, _pcm: &[u8]) -> Result<Vec<SessionEvent>, SessionError> {
        Err(SessionError::Transport("audio input is not supported over REST".to_string()))
    }

    fn respond(&mut self, call_id: &str, response: Value) -> Result<Vec<SessionEvent>, SessionError> {
        let Some(pos) = self.pending.iter().position(|(id, _)| id == call_id) else {
            return Err(SessionError::Transport(format!("no pending call '{call_id}'")));
        };
        let (_, name) = self.pending.remove(pos);
        self.responses.push(json!({
            "functionResponse": { "name": name, "response": response }
        }));
        if !self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let parts = std::mem::take(&mut self.responses);
        self.history.push(json!({ "role": "user", "parts": parts }));
        self.exchange()
    }

    fn close(&mut self) {
        self.connected = false;
        self.pending.clear();
        self.responses.clear();
    }
}
