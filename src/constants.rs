/// Instruction used when a task has no technical prompt of its own
pub const DEFAULT_INSTRUCTION: &str = "You are the assistant of a retrieval-augmented help desk. Answer to the point and rely only on the context provided.";

/// Header introducing the retrieved context block
pub const CONTEXT_HEADER: &str = "Context from internal documents:";

/// Context block content when retrieval returned nothing
pub const NO_CONTEXT_MARKER: &str = "No context found in the documents.";

/// Label preceding the verbatim user query in the prompt
pub const QUESTION_LABEL: &str = "User question:";

/// Closing instruction appended to every generation prompt
pub const CLOSING_INSTRUCTION: &str = "Answer concisely, relying on the context. If the information is insufficient, say so explicitly.";

/// Addendum of the research pass, the first draft follows it
pub const RESEARCH_ADDENDUM: &str = "A first draft answer was produced from a narrower context. Review it against the wider context above, correct anything the context contradicts, complete what is missing and return the improved answer only.";

/// Label preceding the first draft in a research prompt
pub const DRAFT_LABEL: &str = "First draft:";

/// Instruction sent to the classifier, the task catalog follows it
pub const ROUTING_INSTRUCTION: &str = "You route user requests to tasks. Pick the single task from the catalog below that best fits the request. Reply with exactly one JSON object of the form {\"task_id\": \"<id>\", \"task_type\": \"<type>\"} and nothing else.";

/// JSON schema every classifier answer must satisfy
pub const ROUTING_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["task_id", "task_type"],
    "properties": {
        "task_id": { "type": "string", "minLength": 1 },
        "task_type": { "type": "string", "minLength": 1 }
    }
}"#;

/// Prefix of the answer returned when live generation is disabled
pub const DEBUG_ANSWER_PREFIX: &str = "[debug] live generation is disabled in environment=";

/// Prompt used by the backend connectivity probe
pub const LLM_PROBE_PROMPT: &str = "Reply with a single word: pong";

/// Tracing target of structured query events
pub const EVENTS_TARGET: &str = "ragdesk::events";

/// File name of the rotated service log
pub const LOG_FILE_NAME: &str = "ragdesk.log";
