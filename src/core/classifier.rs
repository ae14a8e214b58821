use crate::config::{RoutingConfig, TaskKind};
use crate::constants::{ROUTING_INSTRUCTION, ROUTING_SCHEMA};
use crate::core::registry::{RegisteredTaskSummary, TaskRegistry};
use crate::llm::{build_validator, validate_response, ChatMessage, FormatError, LlmProvider};
use jsonschema::Validator;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Task chosen for an unstructured query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub ok: bool,
    pub task_id: Option<String>,
    pub task_kind: Option<TaskKind>,
    pub confidence: f32,
    pub error: Option<String>,
}

/// Maps free-form queries to a registered task using the generation backend
pub struct QueryClassifier {
    llm: Arc<dyn LlmProvider>,
    registry: Arc<TaskRegistry>,
    routing: RoutingConfig,
    validator: Validator,
}

impl fmt::Debug for QueryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClassifier")
            .field("llm", &self.llm)
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}

fn catalog_prompt(catalog: &[RegisteredTaskSummary]) -> String {
    let mut prompt = format!("{}\n\nTask catalog:", ROUTING_INSTRUCTION);
    for task in catalog {
        let purpose = if task.description.trim().is_empty() {
            task.display_name.as_str()
        } else {
            task.description.trim()
        };
        prompt.push_str(&format!("\n- task_id={}, task_type={}: {}", task.id, task.kind, purpose));
    }
    prompt
}

impl QueryClassifier {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        registry: Arc<TaskRegistry>,
        routing: RoutingConfig,
    ) -> Result<Self, FormatError> {
        Ok(Self {
            llm,
            registry,
            routing,
            validator: build_validator(ROUTING_SCHEMA)?,
        })
    }

    fn fallback(&self, reason: String) -> ClassificationResult {
        warn!(
            "Classification fell back to {}: {}",
            self.routing.default_task_id, reason
        );
        ClassificationResult {
            ok: true,
            task_id: Some(self.routing.default_task_id.clone()),
            task_kind: Some(self.routing.default_task_type),
            confidence: 0.0,
            error: Some(reason),
        }
    }

    /// Classifies a query against the current task catalog.
    ///
    /// Unusable answers fall back to the configured default task with zero
    /// confidence; only a backend failure yields `ok = false`.
    pub async fn classify(&self, query: &str) -> ClassificationResult {
        let catalog = self.registry.clone().list_all_async().await;
        let messages = vec![
            ChatMessage::system(&catalog_prompt(&catalog)),
            ChatMessage::user(query),
        ];

        let reply = match self.llm.call_llm_api(messages, None).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Classifier backend call failed: {}", e);
                return ClassificationResult {
                    ok: false,
                    task_id: None,
                    task_kind: None,
                    confidence: 0.0,
                    error: Some(e.to_string()),
                };
            }
        };
        debug!("Classifier reply: {}", reply);

        let value = match validate_response(&self.validator, &reply) {
            Ok(Some(value)) => value,
            Ok(None) => {
                return self.fallback("classifier reply does not match the routing schema".into())
            }
            Err(e) => return self.fallback(format!("unparseable classifier reply: {}", e)),
        };

        let task_id = value["task_id"].as_str().unwrap_or_default().trim();
        let task_type = value["task_type"].as_str().unwrap_or_default();
        let Some(entry) = catalog.iter().find(|t| t.id == task_id) else {
            return self.fallback(format!("classifier chose unknown task_id={}", task_id));
        };
        match task_type.parse::<TaskKind>() {
            Ok(kind) if kind == entry.kind => ClassificationResult {
                ok: true,
                task_id: Some(entry.id.clone()),
                task_kind: Some(kind),
                confidence: 1.0,
                error: None,
            },
            _ => self.fallback(format!(
                "classifier task_type={} does not match task_id={} ({})",
                task_type, entry.id, entry.kind
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{backend_status_error, demo_hello, demo_rules, ScriptedLlm};

    fn classifier(llm: Arc<ScriptedLlm>) -> QueryClassifier {
        let registry = Arc::new(TaskRegistry::from_definitions([demo_hello(), demo_rules()]));
        QueryClassifier::new(llm, registry, RoutingConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_clean_match() {
        let llm = ScriptedLlm::replying(&[r#"{"task_id": "demo_rules", "task_type": "demo"}"#]);
        let result = classifier(llm.clone()).classify("what are the rules?").await;

        assert!(result.ok);
        assert_eq!(result.task_id.as_deref(), Some("demo_rules"));
        assert_eq!(result.task_kind, Some(TaskKind::Demo));
        assert_eq!(result.confidence, 1.0);
        assert!(result.error.is_none());

        let (messages, _) = &llm.calls()[0];
        assert!(messages[0].content.contains("task_id=demo_hello, task_type=demo"));
        assert_eq!(messages[1].content, "what are the rules?");
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let llm = ScriptedLlm::replying(&[
            "```json\n{\"task_id\": \"demo_hello\", \"task_type\": \"demo\"}\n```",
        ]);
        let result = classifier(llm).classify("hi").await;
        assert_eq!(result.task_id.as_deref(), Some("demo_hello"));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back_to_default() {
        let llm = ScriptedLlm::replying(&["I would pick the rules task"]);
        let result = classifier(llm).classify("rules?").await;

        assert!(result.ok);
        assert_eq!(result.task_id.as_deref(), Some("demo_hello"));
        assert_eq!(result.task_kind, Some(TaskKind::Demo));
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.unwrap().contains("unparseable"));
    }

    #[tokio::test]
    async fn test_unknown_task_and_kind_mismatch_fall_back() {
        let llm = ScriptedLlm::replying(&[
            r#"{"task_id": "secret_task", "task_type": "demo"}"#,
            r#"{"task_id": "demo_rules", "task_type": "corporate"}"#,
            r#"{"task_id": "demo_rules"}"#,
        ]);
        let classifier = classifier(llm);
        for _ in 0..3 {
            let result = classifier.classify("q").await;
            assert!(result.ok);
            assert_eq!(result.task_id.as_deref(), Some("demo_hello"));
            assert_eq!(result.confidence, 0.0);
            assert!(result.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_ok() {
        let llm = ScriptedLlm::new([Err(backend_status_error(502))]);
        let result = classifier(llm).classify("q").await;

        assert!(!result.ok);
        assert!(result.task_id.is_none());
        assert!(result.task_kind.is_none());
        assert!(result.error.unwrap().contains("502"));
    }
}
