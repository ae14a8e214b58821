use crate::config::{Environment, GenerationMode, Postprocessing, TaskDefinition, TaskKind};
use crate::constants::DEBUG_ANSWER_PREFIX;
use crate::core::classifier::QueryClassifier;
use crate::core::environment::EnvironmentSource;
use crate::core::policy::{self, PolicyFlags};
use crate::core::prompt;
use crate::core::registry::{RegistryError, TaskRegistry};
use crate::core::retrieval::{self, RetrievedFragment, Retriever};
use crate::event::{EventSink, EventType, QueryEvent};
use crate::export::{ExportedFile, Exporter};
use crate::llm::{ChatMessage, LlmProvider};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

fn default_task_type() -> String {
    TaskKind::Demo.as_str().to_string()
}

/// Query addressed to an explicit task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskQueryRequest {
    pub task_id: String,
    /// Expected kind of the task, checked against its definition
    #[serde(default = "default_task_type")]
    pub task_type: String,
    pub query: String,
    #[serde(default)]
    pub debug: bool,
}

/// Query whose task is chosen by the classifier
#[derive(Debug, Clone, Deserialize)]
pub struct RoutedQueryRequest {
    pub query: String,
    #[serde(default)]
    pub debug: bool,
}

/// Terminal outcome of one orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Answered,
    NotFound,
    KindMismatch,
    Forbidden,
    BackendFailure,
    RoutingFailure,
}

/// Diagnostic metadata returned with every answer
#[derive(Debug, Clone, Serialize)]
pub struct QueryMeta {
    pub request_id: String,
    pub task_id: Option<String>,
    pub task_type: Option<TaskKind>,
    pub environment: Environment,
    pub fragments_count: usize,
    pub research_used: bool,
    pub generation_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragments: Option<Vec<RetrievedFragment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub ok: bool,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub meta: QueryMeta,
    #[serde(skip)]
    pub status: QueryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedQueryResponse {
    #[serde(flatten)]
    pub response: QueryResponse,
    pub routed_task_id: Option<String>,
    pub routed_task_type: Option<TaskKind>,
    pub classification_confidence: f32,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Resolve,
    Authorize,
    Retrieve,
    DebugCheck,
    Generate,
    Research,
    Postprocess,
    Finalize,
}

/// Emits the events of one request under a shared request id
struct RequestTrace {
    request_id: String,
    events: Arc<dyn EventSink>,
    task_id: Option<String>,
    task_kind: Option<TaskKind>,
}

impl RequestTrace {
    fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            events,
            task_id: None,
            task_kind: None,
        }
    }

    fn emit(&self, event_type: EventType, payload: Value) {
        self.events.record(QueryEvent {
            event_type,
            request_id: self.request_id.clone(),
            task_id: self.task_id.clone(),
            task_kind: self.task_kind,
            payload,
            timestamp: Utc::now(),
        });
    }
}

/// Mutable state of one run as it moves through the stages
struct Run<'a> {
    request: &'a TaskQueryRequest,
    trace: RequestTrace,
    started: Instant,
    environment: Environment,
    flags: PolicyFlags,
    task: Option<Arc<TaskDefinition>>,
    status: QueryStatus,
    answer: Option<String>,
    error: Option<String>,
    fragments: Vec<RetrievedFragment>,
    prompt: Option<String>,
    access_reason: Option<String>,
    generation_disabled: bool,
    research_used: bool,
    debug_returned: bool,
    export: Option<ExportedFile>,
    export_error: Option<String>,
}

impl Run<'_> {
    fn fail(&mut self, status: QueryStatus, error: String) -> Stage {
        self.status = status;
        self.error = Some(error);
        Stage::Finalize
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Sequences registry lookup, access policy, retrieval, generation, research
/// and export for every query
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    environment: Arc<dyn EnvironmentSource>,
    llm: Arc<dyn LlmProvider>,
    retriever: Retriever,
    classifier: QueryClassifier,
    exporter: Arc<dyn Exporter>,
    events: Arc<dyn EventSink>,
    generation_mode: GenerationMode,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        environment: Arc<dyn EnvironmentSource>,
        llm: Arc<dyn LlmProvider>,
        retriever: Retriever,
        classifier: QueryClassifier,
        exporter: Arc<dyn Exporter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            environment,
            llm,
            retriever,
            classifier,
            exporter,
            events,
            generation_mode: GenerationMode::Live,
        }
    }

    pub fn with_generation_mode(mut self, mode: GenerationMode) -> Self {
        self.generation_mode = mode;
        self
    }

    /// Answers a query addressed to an explicit task
    pub async fn run(&self, request: &TaskQueryRequest) -> QueryResponse {
        self.execute(request, RequestTrace::new(self.events.clone()))
            .await
    }

    /// Classifies the query, then runs the pipeline for the chosen task under
    /// the same request id
    pub async fn run_routed(&self, request: &RoutedQueryRequest) -> RoutedQueryResponse {
        let trace = RequestTrace::new(self.events.clone());
        let started = Instant::now();
        let classification = self.classifier.classify(&request.query).await;
        trace.emit(
            EventType::Routing,
            json!({
                "ok": classification.ok,
                "task_id": classification.task_id,
                "task_type": classification.task_kind,
                "confidence": classification.confidence,
                "error": classification.error,
                "duration_ms": elapsed_ms(started),
            }),
        );

        let (Some(task_id), Some(kind)) = (classification.task_id.clone(), classification.task_kind)
        else {
            let error = format!(
                "Routing failed: {}",
                classification.error.as_deref().unwrap_or("no task selected")
            );
            trace.emit(
                EventType::Final,
                json!({
                    "ok": false,
                    "status": QueryStatus::RoutingFailure,
                    "answer_len": 0,
                    "error": error,
                    "duration_ms": elapsed_ms(started),
                }),
            );
            let environment = self.environment.current_environment();
            return RoutedQueryResponse {
                response: QueryResponse {
                    ok: false,
                    answer: None,
                    error: Some(error),
                    meta: QueryMeta {
                        request_id: trace.request_id.clone(),
                        task_id: None,
                        task_type: None,
                        environment,
                        fragments_count: 0,
                        research_used: false,
                        generation_disabled: false,
                        access_reason: None,
                        export: None,
                        export_error: None,
                        fragments: None,
                        prompt: None,
                    },
                    status: QueryStatus::RoutingFailure,
                },
                routed_task_id: None,
                routed_task_type: None,
                classification_confidence: classification.confidence,
            };
        };

        info!("Routed query to {} ({})", task_id, kind);
        let task_request = TaskQueryRequest {
            task_id: task_id.clone(),
            task_type: kind.as_str().to_string(),
            query: request.query.clone(),
            debug: request.debug,
        };
        let response = self.execute(&task_request, trace).await;
        RoutedQueryResponse {
            response,
            routed_task_id: Some(task_id),
            routed_task_type: Some(kind),
            classification_confidence: classification.confidence,
        }
    }

    async fn execute(&self, request: &TaskQueryRequest, trace: RequestTrace) -> QueryResponse {
        let mut run = Run {
            request,
            trace,
            started: Instant::now(),
            environment: self.environment.current_environment(),
            flags: self.environment.policy_flags(),
            task: None,
            status: QueryStatus::Answered,
            answer: None,
            error: None,
            fragments: Vec::new(),
            prompt: None,
            access_reason: None,
            generation_disabled: false,
            research_used: false,
            debug_returned: false,
            export: None,
            export_error: None,
        };
        debug!(
            "Request {} for task {} in {}",
            run.trace.request_id, request.task_id, run.environment
        );

        let mut stage = Stage::Resolve;
        while stage != Stage::Finalize {
            stage = match stage {
                Stage::Resolve => self.resolve(&mut run),
                Stage::Authorize => self.authorize(&mut run),
                Stage::Retrieve => self.retrieve(&mut run).await,
                Stage::DebugCheck => self.debug_check(&mut run),
                Stage::Generate => self.generate(&mut run).await,
                Stage::Research => self.research(&mut run).await,
                Stage::Postprocess => self.postprocess(&mut run).await,
                Stage::Finalize => Stage::Finalize,
            };
        }
        self.finalize(run)
    }

    fn resolve(&self, run: &mut Run<'_>) -> Stage {
        let request = run.request;
        let requested = &request.task_id;
        let task = match self.registry.get(requested) {
            Ok(task) => task,
            Err(e) => {
                let detail = match &e {
                    RegistryError::TaskNotFound(_) => "missing",
                    RegistryError::InvalidTask { .. } => "invalid",
                };
                run.trace.emit(
                    EventType::TaskNotFound,
                    json!({ "requested_task_id": requested, "reason": detail, "error": e.to_string() }),
                );
                return run.fail(QueryStatus::NotFound, e.to_string());
            }
        };
        run.trace.task_id = Some(task.id.clone());

        let requested_type = request.task_type.as_str();
        let mismatch = match requested_type.parse::<TaskKind>() {
            Ok(kind) if kind == task.kind => None,
            Ok(_) => Some(format!(
                "Request task_type={} does not match TaskConfig.task_type={}",
                requested_type, task.kind
            )),
            Err(()) => Some(format!(
                "Unknown task_type={}, expected one of: {}",
                requested_type,
                TaskKind::EXPECTED
            )),
        };
        if let Some(reason) = mismatch {
            run.trace.emit(
                EventType::TaskKindMismatch,
                json!({ "requested_task_type": requested_type, "task_type": task.kind, "reason": reason }),
            );
            return run.fail(QueryStatus::KindMismatch, reason);
        }

        run.trace.task_kind = Some(task.kind);
        run.trace.emit(
            EventType::TaskResolved,
            json!({
                "name": task.display_name,
                "sources_mode": task.sources_mode,
                "research_enabled": task.research_enabled,
                "postprocessing": task.postprocessing,
            }),
        );
        run.task = Some(task);
        Stage::Authorize
    }

    fn authorize(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        let decision = policy::decide(&task, run.environment, run.flags);
        run.trace.emit(
            EventType::AccessCheck,
            json!({
                "allowed": decision.allowed,
                "reason": decision.reason,
                "environment": run.environment,
            }),
        );
        run.access_reason = Some(decision.reason.clone());
        if !decision.allowed {
            warn!("Access denied to {}: {}", task.id, decision.reason);
            return run.fail(QueryStatus::Forbidden, decision.reason);
        }
        run.generation_disabled = policy::generation_disabled(task.kind, run.environment)
            || self.generation_mode == GenerationMode::Disabled;
        Stage::Retrieve
    }

    async fn retrieve(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        if !retrieval::is_context_driven(&task) {
            run.trace.emit(
                EventType::Retrieval,
                json!({ "skipped": true, "count": 0, "duration_ms": 0 }),
            );
            return Stage::DebugCheck;
        }

        let started = Instant::now();
        let top_k = retrieval::base_top_k(&task);
        match self
            .retriever
            .retrieve(&task, &run.request.query, top_k)
            .await
        {
            Ok(fragments) => {
                run.trace.emit(
                    EventType::Retrieval,
                    json!({
                        "count": fragments.len(),
                        "top_k": top_k,
                        "duration_ms": elapsed_ms(started),
                    }),
                );
                run.fragments = fragments;
                Stage::DebugCheck
            }
            Err(e) => {
                run.trace.emit(
                    EventType::Retrieval,
                    json!({
                        "count": 0,
                        "top_k": top_k,
                        "duration_ms": elapsed_ms(started),
                        "error": e.to_string(),
                    }),
                );
                run.fail(
                    QueryStatus::BackendFailure,
                    format!("Retrieval failed: {}", e),
                )
            }
        }
    }

    fn debug_check(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        if !run.generation_disabled {
            return Stage::Generate;
        }
        run.prompt = Some(prompt::build(&task, &run.request.query, &run.fragments));
        run.answer = Some(format!("{}{}", DEBUG_ANSWER_PREFIX, run.environment));
        run.debug_returned = true;
        run.trace.emit(
            EventType::DebugReturn,
            json!({
                "environment": run.environment,
                "generation_mode": self.generation_mode,
                "fragments_count": run.fragments.len(),
            }),
        );
        Stage::Finalize
    }

    async fn generate(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        let system_prompt = prompt::build(&task, &run.request.query, &run.fragments);
        let messages = vec![
            ChatMessage::system(&system_prompt),
            ChatMessage::user(&run.request.query),
        ];
        run.prompt = Some(system_prompt);

        let started = Instant::now();
        match self
            .llm
            .call_llm_api(messages, task.llm_model.as_deref())
            .await
        {
            Ok(answer) => {
                run.trace.emit(
                    EventType::LlmResponse,
                    json!({
                        "answer_len": answer.chars().count(),
                        "model": task.llm_model,
                        "duration_ms": elapsed_ms(started),
                    }),
                );
                run.answer = Some(answer);
            }
            Err(e) => {
                run.trace.emit(
                    EventType::LlmError,
                    json!({ "error": e.to_string(), "duration_ms": elapsed_ms(started) }),
                );
                return run.fail(QueryStatus::BackendFailure, e.to_string());
            }
        }

        if task.research_enabled {
            Stage::Research
        } else {
            Self::after_generation(&task)
        }
    }

    fn after_generation(task: &TaskDefinition) -> Stage {
        if task.postprocessing == Postprocessing::None {
            Stage::Finalize
        } else {
            Stage::Postprocess
        }
    }

    async fn research(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        let started = Instant::now();
        let base = retrieval::base_top_k(&task);
        let candidate_count = retrieval::research_candidate_count(base);

        let fragments = if retrieval::is_context_driven(&task) {
            match self
                .retriever
                .retrieve_for_research(&task, &run.request.query, base)
                .await
            {
                Ok(fragments) => fragments,
                Err(e) => {
                    run.trace.emit(
                        EventType::ResearchError,
                        json!({ "stage": "retrieval", "error": e.to_string(), "duration_ms": elapsed_ms(started) }),
                    );
                    return Self::after_generation(&task);
                }
            }
        } else {
            Vec::new()
        };

        let draft = run.answer.clone().unwrap_or_default();
        let research_prompt =
            prompt::build_research(&task, &run.request.query, &fragments, &draft);
        let messages = vec![
            ChatMessage::system(&research_prompt),
            ChatMessage::user(&run.request.query),
        ];
        match self
            .llm
            .call_llm_api(messages, task.llm_model.as_deref())
            .await
        {
            Ok(answer) => {
                run.trace.emit(
                    EventType::Research,
                    json!({
                        "count": fragments.len(),
                        "candidate_count": candidate_count,
                        "answer_len": answer.chars().count(),
                        "duration_ms": elapsed_ms(started),
                    }),
                );
                run.answer = Some(answer);
                run.fragments = fragments;
                run.prompt = Some(research_prompt);
                run.research_used = true;
            }
            Err(e) => {
                warn!("Research pass failed for {}, keeping first answer: {}", task.id, e);
                run.trace.emit(
                    EventType::ResearchError,
                    json!({ "stage": "generation", "error": e.to_string(), "duration_ms": elapsed_ms(started) }),
                );
            }
        }
        Self::after_generation(&task)
    }

    async fn postprocess(&self, run: &mut Run<'_>) -> Stage {
        let Some(task) = run.task.clone() else {
            return Stage::Finalize;
        };
        let answer = run.answer.clone().unwrap_or_default();
        match self
            .exporter
            .export(task.postprocessing, &answer, &task)
            .await
        {
            Ok(exported) => {
                run.trace.emit(
                    EventType::Postprocess,
                    json!({
                        "format": task.postprocessing,
                        "path": exported.path,
                        "filename": exported.filename,
                    }),
                );
                run.export = Some(exported);
            }
            Err(e) => {
                warn!("Export failed for {}: {}", task.id, e);
                run.trace.emit(
                    EventType::PostprocessError,
                    json!({ "format": task.postprocessing, "error": e.to_string() }),
                );
                run.export_error = Some(e.to_string());
            }
        }
        Stage::Finalize
    }

    fn finalize(&self, run: Run<'_>) -> QueryResponse {
        let ok = run.status == QueryStatus::Answered;
        let answer = if ok { run.answer } else { None };
        run.trace.emit(
            EventType::Final,
            json!({
                "ok": ok,
                "status": run.status,
                "answer_len": answer.as_deref().map(|a| a.chars().count()).unwrap_or(0),
                "error": run.error,
                "duration_ms": elapsed_ms(run.started),
            }),
        );

        let debug = run.request.debug;
        // The short-circuit always reports what generation would have used
        let with_fragments = debug || run.debug_returned;
        QueryResponse {
            ok,
            answer,
            error: run.error,
            meta: QueryMeta {
                request_id: run.trace.request_id,
                task_id: run.task.as_ref().map(|t| t.id.clone()),
                task_type: run.task.as_ref().map(|t| t.kind),
                environment: run.environment,
                fragments_count: run.fragments.len(),
                research_used: run.research_used,
                generation_disabled: run.generation_disabled,
                access_reason: run.access_reason,
                export: run.export,
                export_error: run.export_error,
                fragments: with_fragments.then_some(run.fragments),
                prompt: if debug { run.prompt } else { None },
            },
            status: run.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyConfig, RoutingConfig};
    use crate::core::environment::ConfigEnvironment;
    use crate::core::rag::InMemoryVectorIndex;
    use crate::core::testing::{
        backend_status_error, corporate_research, demo_hello, demo_rules, plain_chat, ScriptedLlm,
        SwitchableEnvironment,
    };
    use crate::event::MemoryEventSink;
    use crate::export::FileExporter;
    use crate::llm::HashingEmbedder;
    use tempfile::TempDir;

    struct Harness {
        orchestrator: Orchestrator,
        llm: Arc<ScriptedLlm>,
        events: Arc<MemoryEventSink>,
        exports: TempDir,
    }

    fn harness(environment: Environment, allow_corporate_in_dev: bool, llm: Arc<ScriptedLlm>) -> Harness {
        let env = Arc::new(ConfigEnvironment::fixed(
            environment,
            PolicyConfig {
                allow_corporate_in_dev,
            },
        ));
        harness_with(env, llm)
    }

    fn harness_with(env: Arc<dyn EnvironmentSource>, llm: Arc<ScriptedLlm>) -> Harness {
        let mut docx_task = demo_rules();
        docx_task.id = "docx_report".to_string();
        docx_task.postprocessing = Postprocessing::DocxFile;

        let registry = Arc::new(TaskRegistry::from_definitions([
            demo_hello(),
            demo_rules(),
            corporate_research(),
            plain_chat(),
            docx_task,
        ]));
        let embedder = Arc::new(HashingEmbedder::new(256).unwrap());
        let retriever = Retriever::new(Arc::new(InMemoryVectorIndex::new(embedder)));
        let classifier =
            QueryClassifier::new(llm.clone(), registry.clone(), RoutingConfig::default()).unwrap();
        let exports = tempfile::tempdir().unwrap();
        let events = Arc::new(MemoryEventSink::new());
        let orchestrator = Orchestrator::new(
            registry,
            env,
            llm.clone(),
            retriever,
            classifier,
            Arc::new(FileExporter::new(exports.path())),
            events.clone(),
        );
        Harness {
            orchestrator,
            llm,
            events,
            exports,
        }
    }

    fn request(task_id: &str, task_type: &str, query: &str) -> TaskQueryRequest {
        TaskQueryRequest {
            task_id: task_id.to_string(),
            task_type: task_type.to_string(),
            query: query.to_string(),
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_demo_task_answers_in_dev() {
        let h = harness(Environment::Dev, false, ScriptedLlm::replying(&["It is a ticket system."]));
        let response = h
            .orchestrator
            .run(&request("demo_hello", "demo", "describe the demo system"))
            .await;

        assert!(response.ok);
        assert_eq!(response.status, QueryStatus::Answered);
        assert_eq!(response.answer.as_deref(), Some("It is a ticket system."));
        assert_eq!(response.meta.fragments_count, 1);
        assert!(response.meta.fragments.is_none());

        let calls = h.llm.calls();
        assert_eq!(calls.len(), 1);
        let (messages, model) = &calls[0];
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("source=demo_hello_doc_1"));
        assert_eq!(messages[1].content, "describe the demo system");
        assert!(model.is_none());

        assert_eq!(
            h.events.event_types(),
            vec![
                EventType::TaskResolved,
                EventType::AccessCheck,
                EventType::Retrieval,
                EventType::LlmResponse,
                EventType::Final,
            ]
        );
        let events = h.events.events();
        assert!(events
            .iter()
            .all(|e| e.request_id == response.meta.request_id));
        assert!(events.iter().all(|e| e.task_id.as_deref() == Some("demo_hello")));
    }

    #[tokio::test]
    async fn test_corporate_denied_in_dev_without_flag() {
        let h = harness(Environment::Dev, false, ScriptedLlm::replying(&["unused"]));
        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "what is the policy?"))
            .await;

        assert!(!response.ok);
        assert_eq!(response.status, QueryStatus::Forbidden);
        assert!(response.error.unwrap().contains("prod"));
        assert_eq!(h.llm.call_count(), 0);
        assert_eq!(
            h.events.event_types(),
            vec![EventType::TaskResolved, EventType::AccessCheck, EventType::Final]
        );
    }

    #[tokio::test]
    async fn test_demo_denied_in_prod() {
        let h = harness(Environment::Prod, false, ScriptedLlm::replying(&[]));
        let response = h.orchestrator.run(&request("demo_hello", "demo", "q")).await;
        assert_eq!(response.status, QueryStatus::Forbidden);
    }

    #[tokio::test]
    async fn test_unknown_task_and_kind_mismatch() {
        let h = harness(Environment::Dev, false, ScriptedLlm::replying(&[]));

        let response = h.orchestrator.run(&request("nope", "demo", "q")).await;
        assert_eq!(response.status, QueryStatus::NotFound);
        assert!(response.error.unwrap().contains("task_id=nope"));

        let response = h
            .orchestrator
            .run(&request("demo_hello", "corporate", "q"))
            .await;
        assert_eq!(response.status, QueryStatus::KindMismatch);

        let response = h
            .orchestrator
            .run(&request("demo_hello", "secret", "q"))
            .await;
        assert_eq!(response.status, QueryStatus::KindMismatch);
        assert!(response.error.unwrap().contains("Unknown task_type=secret"));

        assert_eq!(
            h.events.event_types(),
            vec![
                EventType::TaskNotFound,
                EventType::Final,
                EventType::TaskKindMismatch,
                EventType::Final,
                EventType::TaskKindMismatch,
                EventType::Final,
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_logs_llm_error_before_final() {
        let llm = ScriptedLlm::new([Err(backend_status_error(500))]);
        let h = harness(Environment::Dev, false, llm);
        let response = h.orchestrator.run(&request("demo_hello", "demo", "q")).await;

        assert!(!response.ok);
        assert_eq!(response.status, QueryStatus::BackendFailure);
        assert!(response.answer.is_none());
        assert!(response.error.unwrap().contains("500"));

        let types = h.events.event_types();
        assert_eq!(types[types.len() - 2], EventType::LlmError);
        assert_eq!(types[types.len() - 1], EventType::Final);
    }

    #[tokio::test]
    async fn test_research_replaces_first_answer_and_exports() {
        let h = harness(
            Environment::Prod,
            false,
            ScriptedLlm::replying(&["first draft", "refined answer"]),
        );
        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "how do I get access?"))
            .await;

        assert!(response.ok);
        assert_eq!(response.answer.as_deref(), Some("refined answer"));
        assert!(response.meta.research_used);

        let calls = h.llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0[0].content.contains("First draft:\nfirst draft"));
        assert_eq!(calls[1].1.as_deref(), Some("corp-model"));

        let export = response.meta.export.expect("answer should be exported");
        assert!(export.path.starts_with(h.exports.path().to_str().unwrap()));
        let written = std::fs::read_to_string(&export.path).unwrap();
        assert!(written.contains("refined answer"));

        assert_eq!(
            h.events.event_types(),
            vec![
                EventType::TaskResolved,
                EventType::AccessCheck,
                EventType::Retrieval,
                EventType::LlmResponse,
                EventType::Research,
                EventType::Postprocess,
                EventType::Final,
            ]
        );
    }

    #[tokio::test]
    async fn test_research_failure_keeps_first_answer() {
        let llm = ScriptedLlm::new([Ok("first draft".to_string()), Err(backend_status_error(503))]);
        let h = harness(Environment::Prod, false, llm);
        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;

        assert!(response.ok);
        assert_eq!(response.answer.as_deref(), Some("first draft"));
        assert!(!response.meta.research_used);
        assert!(h.events.event_types().contains(&EventType::ResearchError));
    }

    #[tokio::test]
    async fn test_debug_short_circuit_never_calls_backend() {
        let h = harness(Environment::Test, false, ScriptedLlm::replying(&["unused"]));
        let mut req = request("corp_policies", "corporate", "q");
        req.debug = true;
        let response = h.orchestrator.run(&req).await;

        assert!(response.ok);
        assert_eq!(
            response.answer.as_deref(),
            Some("[debug] live generation is disabled in environment=test")
        );
        assert!(response.meta.generation_disabled);
        assert_eq!(response.meta.fragments.as_ref().map(Vec::len), Some(1));
        assert!(response.meta.prompt.is_some());
        assert_eq!(h.llm.call_count(), 0);
        assert_eq!(
            h.events.event_types(),
            vec![
                EventType::TaskResolved,
                EventType::AccessCheck,
                EventType::Retrieval,
                EventType::DebugReturn,
                EventType::Final,
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_reports_fragments_without_debug_flag() {
        let h = harness(Environment::Test, false, ScriptedLlm::replying(&["unused"]));
        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;

        assert!(response.ok);
        assert!(response.meta.generation_disabled);
        assert_eq!(response.meta.fragments_count, 1);
        let fragments = response.meta.fragments.expect("fragments are always reported");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].source_id, "demo_rules_doc_1");
        assert!(response.meta.prompt.is_none());
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_environment_is_read_per_request() {
        let env = SwitchableEnvironment::new(Environment::Dev);
        let h = harness_with(env.clone(), ScriptedLlm::replying(&["dev answer", "draft", "final"]));

        let response = h.orchestrator.run(&request("demo_hello", "demo", "q")).await;
        assert!(response.ok);
        assert_eq!(response.meta.environment, Environment::Dev);

        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;
        assert_eq!(response.status, QueryStatus::Forbidden);

        env.switch_to(Environment::Prod);
        let response = h.orchestrator.run(&request("demo_hello", "demo", "q")).await;
        assert_eq!(response.status, QueryStatus::Forbidden);
        assert_eq!(response.meta.environment, Environment::Prod);

        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;
        assert!(response.ok);
        assert_eq!(response.answer.as_deref(), Some("final"));
        assert_eq!(h.llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_policy_flag_is_read_per_request() {
        let env = SwitchableEnvironment::new(Environment::Dev);
        let h = harness_with(env.clone(), ScriptedLlm::replying(&["draft", "final"]));

        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;
        assert_eq!(response.status, QueryStatus::Forbidden);

        env.allow_corporate_in_dev(true);
        let response = h
            .orchestrator
            .run(&request("corp_policies", "corporate", "q"))
            .await;
        assert!(response.ok);
        assert_eq!(response.meta.environment, Environment::Dev);
    }

    #[tokio::test]
    async fn test_disabled_generation_mode_short_circuits_demo_tasks() {
        let mut h = harness(Environment::Dev, false, ScriptedLlm::replying(&["unused"]));
        h.orchestrator = h.orchestrator.with_generation_mode(GenerationMode::Disabled);
        let response = h.orchestrator.run(&request("demo_hello", "demo", "q")).await;

        assert!(response.answer.unwrap().starts_with(DEBUG_ANSWER_PREFIX));
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_task_without_search_skips_retrieval() {
        let h = harness(Environment::Dev, false, ScriptedLlm::replying(&["hello"]));
        let response = h.orchestrator.run(&request("plain_chat", "demo", "hi")).await;

        assert!(response.ok);
        assert_eq!(response.meta.fragments_count, 0);
        let retrieval = h
            .events
            .events()
            .into_iter()
            .find(|e| e.event_type == EventType::Retrieval)
            .unwrap();
        assert_eq!(retrieval.payload["skipped"], true);
        assert!(h.llm.calls()[0].0[0].content.contains("No context found"));
    }

    #[tokio::test]
    async fn test_export_failure_still_returns_answer() {
        let h = harness(Environment::Dev, false, ScriptedLlm::replying(&["report"]));
        let response = h.orchestrator.run(&request("docx_report", "demo", "q")).await;

        assert!(response.ok);
        assert_eq!(response.answer.as_deref(), Some("report"));
        assert!(response.meta.export.is_none());
        assert!(response.meta.export_error.unwrap().contains("docx_file"));
        assert!(h.events.event_types().contains(&EventType::PostprocessError));
    }

    #[tokio::test]
    async fn test_routed_query_with_unparseable_classification_uses_default() {
        let h = harness(
            Environment::Dev,
            false,
            ScriptedLlm::replying(&["no idea, sorry", "default task answer"]),
        );
        let response = h
            .orchestrator
            .run_routed(&RoutedQueryRequest {
                query: "what can you do?".to_string(),
                debug: false,
            })
            .await;

        assert_eq!(response.routed_task_id.as_deref(), Some("demo_hello"));
        assert_eq!(response.routed_task_type, Some(TaskKind::Demo));
        assert_eq!(response.classification_confidence, 0.0);
        assert!(response.response.ok);
        assert_eq!(response.response.answer.as_deref(), Some("default task answer"));

        let events = h.events.events();
        assert_eq!(events[0].event_type, EventType::Routing);
        assert!(events
            .iter()
            .all(|e| e.request_id == response.response.meta.request_id));
    }

    #[tokio::test]
    async fn test_routed_query_backend_failure() {
        let h = harness(
            Environment::Dev,
            false,
            ScriptedLlm::new([Err(backend_status_error(502))]),
        );
        let response = h
            .orchestrator
            .run_routed(&RoutedQueryRequest {
                query: "q".to_string(),
                debug: false,
            })
            .await;

        assert!(!response.response.ok);
        assert_eq!(response.response.status, QueryStatus::RoutingFailure);
        assert!(response.routed_task_id.is_none());
        assert_eq!(
            h.events.event_types(),
            vec![EventType::Routing, EventType::Final]
        );
    }

    #[test]
    fn test_routed_response_serializes_flat() {
        let response = RoutedQueryResponse {
            response: QueryResponse {
                ok: true,
                answer: Some("a".to_string()),
                error: None,
                meta: QueryMeta {
                    request_id: "r".to_string(),
                    task_id: Some("demo_hello".to_string()),
                    task_type: Some(TaskKind::Demo),
                    environment: Environment::Dev,
                    fragments_count: 0,
                    research_used: false,
                    generation_disabled: false,
                    access_reason: None,
                    export: None,
                    export_error: None,
                    fragments: None,
                    prompt: None,
                },
                status: QueryStatus::Answered,
            },
            routed_task_id: Some("demo_hello".to_string()),
            routed_task_type: Some(TaskKind::Demo),
            classification_confidence: 1.0,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["routed_task_type"], "demo");
        assert_eq!(value["meta"]["task_type"], "demo");
        assert!(value.get("status").is_none());
        assert!(value["meta"].get("prompt").is_none());
    }
}
