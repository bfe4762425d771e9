//! ria-core: mission ledger, alarm monitor, scoring and assistant plumbing for Ria

pub mod alarm;
pub mod coach;
pub mod error;
pub mod form;
pub mod memory_bank;
pub mod scoring;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod time;
pub mod tool_call;

pub use alarm::{AlarmMonitor, AlarmPolicy, Ringer, is_due};
pub use coach::{AiReply, Citation, Language, RoadmapEntry, parse_roadmap};
pub use error::{FormError, SessionError, StorageError, ToolCallError, ValidationError};
pub use form::{Draft, EntryForm, FormField, FormMode};
pub use memory_bank::MemoryBank;
pub use scoring::{DailyReport, Efficiency, ScoreConfig, daily_efficiency, upsert_report};
pub use session::{AssistantTransport, AudioDevice, SessionEvent, SessionOutcome, VoiceSession};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::TaskStore;
pub use task::{AlarmOffset, Category, NewTask, Repeat, SubTask, Task, TaskPatch, Urgency};
pub use tool_call::ToolCall;
