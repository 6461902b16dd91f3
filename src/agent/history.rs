//! Persisted step history for deterministic replay.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use pagepilot_core_types::{ActionResult, TaskId};

use crate::agent::actions::NavigatorAction;
use crate::errors::AgentError;

/// One executed navigator turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryItem {
    pub step: String,
    pub actions: Vec<NavigatorAction>,
    pub results: Vec<ActionResult>,
}

/// The full action trace of one task run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentStepHistory {
    pub items: Vec<HistoryItem>,
}

impl AgentStepHistory {
    pub fn push(&mut self, item: HistoryItem) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Saved task record: the original objective plus its trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub task: String,
    pub history: AgentStepHistory,
}

/// Persistence seam for task histories.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn store(
        &self,
        task_id: &TaskId,
        task: &str,
        history: &AgentStepHistory,
    ) -> Result<(), AgentError>;

    async fn load(&self, task_id: &TaskId) -> Result<Option<HistoryRecord>, AgentError>;
}

/// In-process history store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<TaskId, HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn store(
        &self,
        task_id: &TaskId,
        task: &str,
        history: &AgentStepHistory,
    ) -> Result<(), AgentError> {
        self.records.write().await.insert(
            task_id.clone(),
            HistoryRecord {
                task: task.to_string(),
                history: history.clone(),
            },
        );
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<HistoryRecord>, AgentError> {
        Ok(self.records.read().await.get(task_id).cloned())
    }
}

/// History store writing one JSON file per task under a directory.
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn store(
        &self,
        task_id: &TaskId,
        task: &str,
        history: &AgentStepHistory,
    ) -> Result<(), AgentError> {
        let record = HistoryRecord {
            task: task.to_string(),
            history: history.clone(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| AgentError::History(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::History(e.to_string()))?;
        tokio::fs::write(self.path_for(task_id), json)
            .await
            .map_err(|e| AgentError::History(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<HistoryRecord>, AgentError> {
        let path = self.path_for(task_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AgentError::History(err.to_string())),
        };
        let record =
            serde_json::from_slice(&bytes).map_err(|e| AgentError::History(e.to_string()))?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> AgentStepHistory {
        AgentStepHistory {
            items: vec![HistoryItem {
                step: "open the docs".into(),
                actions: vec![NavigatorAction::GoToUrl {
                    intent: None,
                    url: "https://docs.rs".into(),
                }],
                results: vec![ActionResult::content("Navigated to https://docs.rs")],
            }],
        }
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemoryHistoryStore::new();
        let id = TaskId::new();
        store.store(&id, "read docs", &sample_history()).await.unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.task, "read docs");
        assert_eq!(record.history.items.len(), 1);
        assert!(store.load(&TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path());
        let id = TaskId::new();
        store.store(&id, "read docs", &sample_history()).await.unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.task, "read docs");
        assert_eq!(record.history.items[0].actions[0].name(), "go_to_url");
        assert!(store.load(&TaskId::new()).await.unwrap().is_none());
    }
}
