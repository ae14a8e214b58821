use crate::config::TaskKind;
use crate::constants::EVENTS_TARGET;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Stages of the query pipeline that produce an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Routing,
    TaskResolved,
    TaskNotFound,
    TaskKindMismatch,
    AccessCheck,
    Retrieval,
    DebugReturn,
    LlmResponse,
    LlmError,
    Research,
    ResearchError,
    Postprocess,
    PostprocessError,
    Final,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Routing => "routing",
            EventType::TaskResolved => "task_resolved",
            EventType::TaskNotFound => "task_not_found",
            EventType::TaskKindMismatch => "task_kind_mismatch",
            EventType::AccessCheck => "access_check",
            EventType::Retrieval => "retrieval",
            EventType::DebugReturn => "debug_return",
            EventType::LlmResponse => "llm_response",
            EventType::LlmError => "llm_error",
            EventType::Research => "research",
            EventType::ResearchError => "research_error",
            EventType::Postprocess => "postprocess",
            EventType::PostprocessError => "postprocess_error",
            EventType::Final => "final",
        }
    }
}

/// Structured record of one pipeline stage, correlated by `request_id`
#[derive(Debug, Clone, Serialize)]
pub struct QueryEvent {
    pub event_type: EventType,
    pub request_id: String,
    pub task_id: Option<String>,
    pub task_kind: Option<TaskKind>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of query events, recording never fails
pub trait EventSink: Send + Sync {
    fn record(&self, event: QueryEvent);
}

/// Writes events as structured log lines
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: QueryEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        info!(
            target: EVENTS_TARGET,
            event_type = event.event_type.as_str(),
            request_id = %event.request_id,
            task_id = event.task_id.as_deref().unwrap_or("-"),
            task_kind = event.task_kind.map(|k| k.as_str()).unwrap_or("-"),
            timestamp = %event.timestamp.to_rfc3339(),
            payload = %payload,
            "query event"
        );
    }
}

/// Keeps events in memory, used by the CLI trace view and in tests
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<QueryEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: QueryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
