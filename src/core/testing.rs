//! Test doubles shared by the pipeline tests

use crate::config::{
    ChunkingStrategy, Environment, Postprocessing, ReferenceDocument, SearchConfig,
    TaskDefinition, TaskKind,
};
use crate::core::environment::{EnvironmentSource, ALLOW_CORPORATE_IN_DEV};
use crate::llm::{ChatMessage, LlmError, LlmProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Backend replaying a fixed list of replies and recording every call
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, Option<String>)>>,
}

impl ScriptedLlm {
    pub fn new(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())))
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages, model.map(str::to_string)));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::MissingContent("scripted")))
    }
}

pub fn backend_status_error(status: u16) -> LlmError {
    LlmError::Status {
        provider: "gateway",
        status,
        body: "internal failure".to_string(),
    }
}

/// Environment that can be changed between requests
#[derive(Debug)]
pub struct SwitchableEnvironment {
    environment: Mutex<Environment>,
    allow_corporate_in_dev: AtomicBool,
}

impl SwitchableEnvironment {
    pub fn new(environment: Environment) -> Arc<Self> {
        Arc::new(Self {
            environment: Mutex::new(environment),
            allow_corporate_in_dev: AtomicBool::new(false),
        })
    }

    pub fn switch_to(&self, environment: Environment) {
        *self.environment.lock().unwrap() = environment;
    }

    pub fn allow_corporate_in_dev(&self, allow: bool) {
        self.allow_corporate_in_dev.store(allow, Ordering::SeqCst);
    }
}

impl EnvironmentSource for SwitchableEnvironment {
    fn current_environment(&self) -> Environment {
        *self.environment.lock().unwrap()
    }

    fn policy_flag(&self, name: &str) -> bool {
        name == ALLOW_CORPORATE_IN_DEV && self.allow_corporate_in_dev.load(Ordering::SeqCst)
    }
}

fn text_search() -> SearchConfig {
    SearchConfig {
        chunking_strategy: ChunkingStrategy::Whole,
        ..SearchConfig::default()
    }
}

pub fn demo_hello() -> TaskDefinition {
    let mut task = TaskDefinition::new("demo_hello");
    task.display_name = "Demo hello".to_string();
    task.description = "Explains what the demo request system does".to_string();
    task.text_search = Some(text_search());
    task.reference_documents = vec![ReferenceDocument {
        id: "demo_hello_doc_1".to_string(),
        text: "This is a demo document of the request system. The system helps employees ask \
               questions about rules and processes and get hints about access and IT services."
            .to_string(),
    }];
    task
}

pub fn demo_rules() -> TaskDefinition {
    let mut task = TaskDefinition::new("demo_rules");
    task.display_name = "Demo rules".to_string();
    task.description = "Answers questions about basic company rules".to_string();
    task.text_search = Some(text_search());
    task.reference_documents = vec![ReferenceDocument {
        id: "demo_rules_doc_1".to_string(),
        text: "Employees must request access to systems through tickets and follow the \
               information security rules."
            .to_string(),
    }];
    task
}

pub fn corporate_research() -> TaskDefinition {
    let mut task = demo_rules();
    task.id = "corp_policies".to_string();
    task.display_name = "Corporate policies".to_string();
    task.kind = TaskKind::Corporate;
    task.research_enabled = true;
    task.postprocessing = Postprocessing::MarkdownFile;
    task.llm_model = Some("corp-model".to_string());
    task
}

/// A demo task without any search sub-config
pub fn plain_chat() -> TaskDefinition {
    let mut task = TaskDefinition::new("plain_chat");
    task.description = "Free conversation without documents".to_string();
    task
}
