use crate::config::{load_task_file, read_task_file, ConfigError, TaskDefinition, TaskKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

const TASK_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Read-only projection of a task used for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredTaskSummary {
    #[serde(rename = "task_id")]
    pub id: String,
    #[serde(rename = "task_type")]
    pub kind: TaskKind,
    #[serde(rename = "name")]
    pub display_name: String,
    pub description: String,
}

impl From<&TaskDefinition> for RegisteredTaskSummary {
    fn from(task: &TaskDefinition) -> Self {
        Self {
            id: task.id.clone(),
            kind: task.kind,
            display_name: task.display_name.clone(),
            description: task.description.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Task config not found for task_id={0}")]
    TaskNotFound(String),
    #[error("Task config for task_id={task_id} is invalid: {source}")]
    InvalidTask {
        task_id: String,
        #[source]
        source: ConfigError,
    },
}

/// Discovers, caches and serves task definitions
#[derive(Debug)]
pub struct TaskRegistry {
    tasks_dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, Arc<TaskDefinition>>>,
}

impl TaskRegistry {
    /// Creates a registry over a directory holding one YAML file per task
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: Some(tasks_dir.into()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry serving a fixed set of definitions
    pub fn from_definitions(definitions: impl IntoIterator<Item = TaskDefinition>) -> Self {
        let cache = definitions
            .into_iter()
            .map(|d| (d.id.clone(), Arc::new(d)))
            .collect();
        Self {
            tasks_dir: None,
            cache: RwLock::new(cache),
        }
    }

    fn cached(&self, task_id: &str) -> Option<Arc<TaskDefinition>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Caches a definition unless its id is already cached, returning the
    /// cached one. The first definition loaded for an id is kept for the
    /// life of the process.
    fn insert(&self, definition: TaskDefinition) -> Arc<TaskDefinition> {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(definition.id.clone())
            .or_insert_with(|| Arc::new(definition))
            .clone()
    }

    /// Returns the definition of a task, loading and caching it on first use
    pub fn get(&self, task_id: &str) -> Result<Arc<TaskDefinition>, RegistryError> {
        if let Some(definition) = self.cached(task_id) {
            return Ok(definition);
        }
        let not_found = || RegistryError::TaskNotFound(task_id.to_string());
        let dir = self.tasks_dir.as_deref().ok_or_else(not_found)?;
        if task_id.is_empty() || task_id.contains(['/', '\\']) || task_id.contains("..") {
            return Err(not_found());
        }

        let invalid = |source| RegistryError::InvalidTask {
            task_id: task_id.to_string(),
            source,
        };
        for ext in TASK_EXTENSIONS {
            let path = dir.join(format!("{}.{}", task_id, ext));
            if path.is_file() {
                let definition = load_task_file(&path).map_err(invalid)?;
                if definition.id == task_id {
                    return Ok(self.insert(definition));
                }
                debug!(
                    "{} declares task_id={}, searching the directory",
                    path.display(),
                    definition.id
                );
            }
        }

        let path = task_files(dir)
            .into_iter()
            .find(|path| declared_id(path).as_deref() == Some(task_id))
            .ok_or_else(not_found)?;
        let definition = load_task_file(&path).map_err(invalid)?;
        Ok(self.insert(definition))
    }

    /// Lists every discoverable task, sorted by id.
    ///
    /// Each source is loaded and cached; sources that fail validation are
    /// logged and left out. When several files declare the same id, files
    /// are taken in name order and the first one wins.
    pub fn list_all(&self) -> Vec<RegisteredTaskSummary> {
        let mut summaries: HashMap<String, RegisteredTaskSummary> = HashMap::new();
        match &self.tasks_dir {
            Some(dir) => {
                let mut seen = HashSet::new();
                for path in task_files(dir) {
                    match load_task_file(&path) {
                        Ok(definition) if !seen.insert(definition.id.clone()) => warn!(
                            "Duplicate task_id={} in {}, keeping the first definition",
                            definition.id,
                            path.display()
                        ),
                        Ok(definition) => {
                            let definition = self.insert(definition);
                            summaries.insert(definition.id.clone(), definition.as_ref().into());
                        }
                        Err(e) => warn!("Skipping task file {}: {}", path.display(), e),
                    }
                }
            }
            None => {
                let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
                for definition in cache.values() {
                    summaries.insert(definition.id.clone(), definition.as_ref().into());
                }
            }
        }

        let mut summaries: Vec<_> = summaries.into_values().collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// [`TaskRegistry::list_all`] run on the blocking thread pool, for callers
    /// on the async runtime
    pub async fn list_all_async(self: Arc<Self>) -> Vec<RegisteredTaskSummary> {
        match tokio::task::spawn_blocking(move || self.list_all()).await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!("Task listing did not complete: {}", e);
                Vec::new()
            }
        }
    }

    /// Ids of the definitions loaded so far
    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

fn task_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read tasks directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| TASK_EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();
    files
}

fn declared_id(path: &Path) -> Option<String> {
    let raw = read_task_file(path).ok()?;
    raw.get("task_id")
        .or_else(|| raw.get("id"))
        .and_then(|v| v.as_str())
        .map(|id| id.trim().to_string())
}
