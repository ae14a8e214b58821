use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

const DEFAULT_EMBEDDING_MODEL: &str = "hashing";
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_MAX_CHUNKS: usize = 5;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Errors raised while turning a raw task configuration into a [`TaskDefinition`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value `{value}` for field `{field}`, expected one of: {expected}")]
    InvalidField {
        field: String,
        value: String,
        expected: &'static str,
    },
    #[error("task config must be a mapping at top level")]
    NotAMapping,
    #[error("malformed task config: {0}")]
    Malformed(String),
    #[error("failed to read task config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse task config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

config_enum! {
    /// Kind of a task, governs access policy and prompt behavior
    TaskKind, "demo, corporate" {
        Demo => "demo",
        Corporate => "corporate",
    }
}

config_enum! {
    /// Which reference sources a task retrieves from
    SourcesMode, "text, tables, text+tables" {
        Text => "text",
        Tables => "tables",
        TextAndTables => "text+tables" | "text_and_tables" | "text_tables",
    }
}

config_enum! {
    /// How nearest-neighbor candidates are cut down to the final fragment list
    SearchMode, "top_k, threshold, hybrid" {
        TopK => "top_k" | "topk",
        Threshold => "threshold" | "threshold_filtered",
        Hybrid => "hybrid",
    }
}

config_enum! {
    /// How reference documents are split before indexing
    ChunkingStrategy, "whole, paragraph, sentence" {
        Whole => "whole" | "none",
        Paragraph => "paragraph",
        Sentence => "sentence",
    }
}

config_enum! {
    /// What happens to the final answer once generated
    Postprocessing, "none, markdown_file, docx_file, custom_script" {
        None => "none",
        MarkdownFile => "markdown_file" | "markdown" | "md",
        DocxFile => "docx_file" | "docx",
        CustomScript => "custom_script" | "script",
    }
}

/// Retrieval settings for one source (text documents or table rows)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    pub enabled: bool,
    pub embedding_model: String,
    pub mode: SearchMode,
    pub top_k: usize,
    pub max_chunks: usize,
    pub similarity_threshold: f32,
    pub chunking_strategy: ChunkingStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            mode: SearchMode::TopK,
            top_k: DEFAULT_TOP_K,
            max_chunks: DEFAULT_MAX_CHUNKS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            chunking_strategy: ChunkingStrategy::Paragraph,
        }
    }
}

/// A fixed reference text used to seed a task's collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    pub id: String,
    pub text: String,
}

/// Validated, immutable definition of a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDefinition {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub kind: TaskKind,
    pub instruction_template: String,
    pub sources_mode: SourcesMode,
    pub text_search: Option<SearchConfig>,
    pub table_search: Option<SearchConfig>,
    pub research_enabled: bool,
    pub postprocessing: Postprocessing,
    pub llm_model: Option<String>,
    pub reference_documents: Vec<ReferenceDocument>,
    pub reference_rows: Vec<ReferenceDocument>,
}

/// On-disk shape of a task file, before validation
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawTaskConfig {
    #[serde(default, alias = "id")]
    task_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "kind")]
    task_type: Option<String>,
    #[serde(default)]
    technical_prompt: Option<String>,
    #[serde(default)]
    sources_mode: Option<String>,
    #[serde(default)]
    text_search: Option<RawSearchConfig>,
    #[serde(default)]
    table_search: Option<RawSearchConfig>,
    #[serde(default)]
    research_enabled: bool,
    #[serde(default)]
    postprocessing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    llm_model: Option<String>,
    #[serde(default)]
    reference_documents: Vec<ReferenceDocument>,
    #[serde(default)]
    reference_rows: Vec<ReferenceDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSearchConfig {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    max_chunks: Option<usize>,
    #[serde(default)]
    similarity_threshold: Option<f32>,
    #[serde(default)]
    chunking_strategy: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn parse_enum<T: FromStr>(
    field: &str,
    value: Option<&str>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidField {
            field: field.to_string(),
            value: v.to_string(),
            expected,
        }),
    }
}

impl RawSearchConfig {
    fn validate(self, section: &str) -> Result<SearchConfig, ConfigError> {
        let field = |name: &str| format!("{}.{}", section, name);

        let similarity_threshold = self
            .similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !similarity_threshold.is_finite() {
            return Err(ConfigError::InvalidField {
                field: field("similarity_threshold"),
                value: similarity_threshold.to_string(),
                expected: "a finite number",
            });
        }

        Ok(SearchConfig {
            enabled: self.enabled,
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            mode: parse_enum(
                &field("mode"),
                self.mode.as_deref(),
                SearchMode::TopK,
                SearchMode::EXPECTED,
            )?,
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            max_chunks: self.max_chunks.unwrap_or(DEFAULT_MAX_CHUNKS),
            similarity_threshold,
            chunking_strategy: parse_enum(
                &field("chunking_strategy"),
                self.chunking_strategy.as_deref(),
                ChunkingStrategy::Paragraph,
                ChunkingStrategy::EXPECTED,
            )?,
        })
    }
}

impl From<&SearchConfig> for RawSearchConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            enabled: config.enabled,
            embedding_model: Some(config.embedding_model.clone()),
            mode: Some(config.mode.as_str().to_string()),
            top_k: Some(config.top_k),
            max_chunks: Some(config.max_chunks),
            similarity_threshold: Some(config.similarity_threshold),
            chunking_strategy: Some(config.chunking_strategy.as_str().to_string()),
        }
    }
}

impl TryFrom<RawTaskConfig> for TaskDefinition {
    type Error = ConfigError;

    fn try_from(raw: RawTaskConfig) -> Result<Self, Self::Error> {
        let id = raw
            .task_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingField("task_id"))?;

        let kind = parse_enum(
            "task_type",
            raw.task_type.as_deref(),
            TaskKind::Demo,
            TaskKind::EXPECTED,
        )?;
        let sources_mode = parse_enum(
            "sources_mode",
            raw.sources_mode.as_deref(),
            SourcesMode::Text,
            SourcesMode::EXPECTED,
        )?;
        let postprocessing = parse_enum(
            "postprocessing",
            raw.postprocessing.as_deref(),
            Postprocessing::None,
            Postprocessing::EXPECTED,
        )?;
        let text_search = raw
            .text_search
            .map(|s| s.validate("text_search"))
            .transpose()?;
        let table_search = raw
            .table_search
            .map(|s| s.validate("table_search"))
            .transpose()?;

        Ok(TaskDefinition {
            display_name: raw.name.unwrap_or_else(|| id.clone()),
            id,
            description: raw.description.unwrap_or_default(),
            kind,
            instruction_template: raw.technical_prompt.unwrap_or_default(),
            sources_mode,
            text_search,
            table_search,
            research_enabled: raw.research_enabled,
            postprocessing,
            llm_model: raw.llm_model,
            reference_documents: raw.reference_documents,
            reference_rows: raw.reference_rows,
        })
    }
}

impl TaskDefinition {
    /// Creates a demo task with every optional field at its default
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            description: String::new(),
            kind: TaskKind::Demo,
            instruction_template: String::new(),
            sources_mode: SourcesMode::Text,
            text_search: None,
            table_search: None,
            research_enabled: false,
            postprocessing: Postprocessing::None,
            llm_model: None,
            reference_documents: Vec::new(),
            reference_rows: Vec::new(),
        }
    }

    /// Parses and validates one raw task configuration
    ///
    /// # Arguments
    /// * `raw` - YAML value holding the task mapping
    ///
    /// # Returns
    /// * `Result<TaskDefinition, ConfigError>` - The validated definition, or an error naming the offending field
    pub fn parse(raw: &serde_yaml::Value) -> Result<Self, ConfigError> {
        if !raw.is_mapping() {
            return Err(ConfigError::NotAMapping);
        }
        let raw: RawTaskConfig = serde_yaml::from_value(raw.clone())
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Serializes the definition back into the task file shape
    pub fn to_raw(&self) -> Result<serde_yaml::Value, ConfigError> {
        let raw = RawTaskConfig {
            task_id: Some(self.id.clone()),
            name: Some(self.display_name.clone()),
            description: Some(self.description.clone()),
            task_type: Some(self.kind.as_str().to_string()),
            technical_prompt: Some(self.instruction_template.clone()),
            sources_mode: Some(self.sources_mode.as_str().to_string()),
            text_search: self.text_search.as_ref().map(RawSearchConfig::from),
            table_search: self.table_search.as_ref().map(RawSearchConfig::from),
            research_enabled: self.research_enabled,
            postprocessing: Some(self.postprocessing.as_str().to_string()),
            llm_model: self.llm_model.clone(),
            reference_documents: self.reference_documents.clone(),
            reference_rows: self.reference_rows.clone(),
        };
        serde_yaml::to_value(raw).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

/// Reads the raw YAML mapping of a task file without validating it
pub fn read_task_file(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let yaml_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&yaml_str).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// Loads and validates a task definition from a YAML file
pub fn load_task_file(path: &Path) -> Result<TaskDefinition, ConfigError> {
    let definition = TaskDefinition::parse(&read_task_file(path)?)?;
    debug!("Loaded task definition {} from {}", definition.id, path.display());
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).expect("test YAML should parse")
    }

    #[test]
    fn test_minimal_task_gets_defaults() {
        let task = TaskDefinition::parse(&yaml("task_id: demo_hello\n")).unwrap();

        assert_eq!(task.id, "demo_hello");
        assert_eq!(task.display_name, "demo_hello");
        assert_eq!(task.kind, TaskKind::Demo);
        assert_eq!(task.sources_mode, SourcesMode::Text);
        assert_eq!(task.postprocessing, Postprocessing::None);
        assert!(task.instruction_template.is_empty());
        assert!(task.text_search.is_none());
        assert!(task.table_search.is_none());
        assert!(!task.research_enabled);
    }

    #[test]
    fn test_full_task_parses() {
        let task = TaskDefinition::parse(&yaml(
            r"
task_id: corp_rules
name: Corporate rules
description: Answers questions about internal rules
task_type: corporate
technical_prompt: You are a helpful assistant.
sources_mode: text+tables
text_search:
  embedding_model: hashing
  mode: threshold-filtered
  top_k: 4
  max_chunks: 10
  similarity_threshold: 0.5
  chunking_strategy: sentence
table_search:
  enabled: false
research_enabled: true
postprocessing: markdown-file
reference_documents:
  - id: rules_1
    text: Access requests go through tickets.
",
        ))
        .unwrap();

        assert_eq!(task.kind, TaskKind::Corporate);
        assert_eq!(task.sources_mode, SourcesMode::TextAndTables);
        assert_eq!(task.postprocessing, Postprocessing::MarkdownFile);
        let text = task.text_search.unwrap();
        assert_eq!(text.mode, SearchMode::Threshold);
        assert_eq!(text.top_k, 4);
        assert_eq!(text.max_chunks, 10);
        assert_eq!(text.chunking_strategy, ChunkingStrategy::Sentence);
        assert!(!task.table_search.unwrap().enabled);
        assert_eq!(task.reference_documents.len(), 1);
        assert!(task.research_enabled);
    }

    #[test]
    fn test_missing_task_id_is_rejected() {
        let err = TaskDefinition::parse(&yaml("name: nameless\n")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("task_id")));

        let err = TaskDefinition::parse(&yaml("task_id: '  '\n")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("task_id")));
    }

    #[test]
    fn test_invalid_enum_names_the_field() {
        let err = TaskDefinition::parse(&yaml("task_id: x\ntask_type: secret\n")).unwrap_err();
        assert!(err.to_string().contains("task_type"));

        let err = TaskDefinition::parse(&yaml("task_id: x\npostprocessing: pdf\n")).unwrap_err();
        assert!(err.to_string().contains("postprocessing"));

        let err =
            TaskDefinition::parse(&yaml("task_id: x\ntext_search:\n  mode: fuzzy\n")).unwrap_err();
        assert!(err.to_string().contains("text_search.mode"));

        let err = TaskDefinition::parse(&yaml("task_id: x\nsources_mode: images\n")).unwrap_err();
        assert!(err.to_string().contains("sources_mode"));
    }

    #[test]
    fn test_non_mapping_is_rejected() {
        let err = TaskDefinition::parse(&yaml("- a\n- b\n")).unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping));
    }

    #[test]
    fn test_load_task_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "task_id: [unclosed").unwrap();

        let err = load_task_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    fn search_config() -> impl Strategy<Value = SearchConfig> {
        (
            any::<bool>(),
            "[a-z0-9-]{1,12}",
            prop_oneof![
                Just(SearchMode::TopK),
                Just(SearchMode::Threshold),
                Just(SearchMode::Hybrid)
            ],
            0usize..50,
            0usize..50,
            0.0f32..2.0,
            prop_oneof![
                Just(ChunkingStrategy::Whole),
                Just(ChunkingStrategy::Paragraph),
                Just(ChunkingStrategy::Sentence)
            ],
        )
            .prop_map(
                |(enabled, embedding_model, mode, top_k, max_chunks, threshold, chunking)| {
                    SearchConfig {
                        enabled,
                        embedding_model,
                        mode,
                        top_k,
                        max_chunks,
                        similarity_threshold: threshold,
                        chunking_strategy: chunking,
                    }
                },
            )
    }

    fn task_definition() -> impl Strategy<Value = TaskDefinition> {
        (
            "[a-z][a-z0-9_]{0,15}",
            ".{0,20}",
            ".{0,40}",
            prop_oneof![Just(TaskKind::Demo), Just(TaskKind::Corporate)],
            ".{0,60}",
            prop_oneof![
                Just(SourcesMode::Text),
                Just(SourcesMode::Tables),
                Just(SourcesMode::TextAndTables)
            ],
            proptest::option::of(search_config()),
            proptest::option::of(search_config()),
            any::<bool>(),
            prop_oneof![
                Just(Postprocessing::None),
                Just(Postprocessing::MarkdownFile),
                Just(Postprocessing::DocxFile),
                Just(Postprocessing::CustomScript)
            ],
            proptest::collection::vec(("[a-z0-9_]{1,8}", ".{0,30}"), 0..3),
        )
            .prop_map(
                |(
                    id,
                    display_name,
                    description,
                    kind,
                    instruction_template,
                    sources_mode,
                    text_search,
                    table_search,
                    research_enabled,
                    postprocessing,
                    docs,
                )| TaskDefinition {
                    id,
                    display_name,
                    description,
                    kind,
                    instruction_template,
                    sources_mode,
                    text_search,
                    table_search,
                    research_enabled,
                    postprocessing,
                    llm_model: None,
                    reference_documents: docs
                        .into_iter()
                        .map(|(id, text)| ReferenceDocument { id, text })
                        .collect(),
                    reference_rows: Vec::new(),
                },
            )
    }

    proptest! {
        #[test]
        fn prop_reparsing_serialized_definition_is_identity(task in task_definition()) {
            let raw = task.to_raw().unwrap();
            let reparsed = TaskDefinition::parse(&raw).unwrap();
            prop_assert_eq!(reparsed, task);
        }
    }
}
