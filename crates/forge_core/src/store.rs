//! Persistence contracts for exchanges and applications.
//!
//! The file store keeps one JSON document per record under the workspace:
//!
//! ```text
//! <root>/.forge/
//! ├── exchanges/<exchangeId>.json
//! └── apps/<applicationId>.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::exchange::Exchange;
use crate::module::Application;

/// Filter for exchange searches.
#[derive(Debug, Clone, Default)]
pub struct ExchangeQuery {
    pub application_id: Option<String>,
    pub running_only: bool,
    pub limit: Option<usize>,
}

impl ExchangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application(mut self, id: impl Into<String>) -> Self {
        self.application_id = Some(id.into());
        self
    }

    pub fn running(mut self) -> Self {
        self.running_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, exchange: &Exchange) -> bool {
        if let Some(app) = &self.application_id {
            if &exchange.application_id != app {
                return false;
            }
        }
        !self.running_only || exchange.is_running()
    }

    /// Filter, sort newest first and truncate.
    fn apply(&self, exchanges: impl Iterator<Item = Exchange>) -> Vec<Exchange> {
        let mut found: Vec<Exchange> = exchanges.filter(|e| self.matches(e)).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = self.limit {
            found.truncate(limit);
        }
        found
    }
}

/// Save/get/search contract for exchange records.
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    async fn save_exchange(&self, exchange: &Exchange) -> CoreResult<()>;

    async fn get_exchange(&self, id: &str) -> CoreResult<Exchange>;

    async fn search_exchanges(&self, query: &ExchangeQuery) -> CoreResult<Vec<Exchange>>;

    /// Advance only the heartbeat of a stored exchange.
    async fn touch_exchange(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()>;
}

/// Save/get contract for applications and their module graphs.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn save_application(&self, app: &Application) -> CoreResult<()>;

    async fn get_application(&self, id: &str) -> CoreResult<Application>;
}

/// JSON-file backed store.
pub struct FileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            root: workspace_root.as_ref().join(".forge"),
            lock: Mutex::new(()),
        }
    }

    fn exchanges_dir(&self) -> PathBuf {
        self.root.join("exchanges")
    }

    fn exchange_path(&self, id: &str) -> PathBuf {
        self.exchanges_dir().join(format!("{}.json", id))
    }

    fn app_path(&self, id: &str) -> PathBuf {
        self.root.join("apps").join(format!("{}.json", id))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json)?;
        debug!("Saved {:?}", path);
        Ok(())
    }

    fn read_exchange(&self, id: &str) -> CoreResult<Exchange> {
        let path = self.exchange_path(id);
        if !path.exists() {
            return Err(CoreError::ExchangeNotFound(id.to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl ExchangeStore for FileStore {
    async fn save_exchange(&self, exchange: &Exchange) -> CoreResult<()> {
        let _guard = self.lock.lock();
        Self::write_json(&self.exchange_path(&exchange.id), exchange)
    }

    async fn get_exchange(&self, id: &str) -> CoreResult<Exchange> {
        let _guard = self.lock.lock();
        self.read_exchange(id)
    }

    async fn search_exchanges(&self, query: &ExchangeQuery) -> CoreResult<Vec<Exchange>> {
        let _guard = self.lock.lock();
        let dir = self.exchanges_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut exchanges = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(CoreError::from)
                .and_then(|c| serde_json::from_str::<Exchange>(&c).map_err(CoreError::from))
            {
                Ok(exchange) => exchanges.push(exchange),
                Err(e) => warn!("Skipping unreadable exchange {:?}: {}", path, e),
            }
        }
        Ok(query.apply(exchanges.into_iter()))
    }

    async fn touch_exchange(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        let _guard = self.lock.lock();
        let mut exchange = self.read_exchange(id)?;
        if !exchange.is_running() {
            return Ok(());
        }
        exchange.touch(at);
        Self::write_json(&self.exchange_path(id), &exchange)
    }
}

#[async_trait]
impl ApplicationStore for FileStore {
    async fn save_application(&self, app: &Application) -> CoreResult<()> {
        let _guard = self.lock.lock();
        Self::write_json(&self.app_path(&app.id), app)
    }

    async fn get_application(&self, id: &str) -> CoreResult<Application> {
        let _guard = self.lock.lock();
        let path = self.app_path(id);
        if !path.exists() {
            return Err(CoreError::ApplicationNotFound(id.to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    exchanges: RwLock<HashMap<String, Exchange>>,
    apps: RwLock<HashMap<String, Application>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeStore for MemoryStore {
    async fn save_exchange(&self, exchange: &Exchange) -> CoreResult<()> {
        self.exchanges
            .write()
            .insert(exchange.id.clone(), exchange.clone());
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> CoreResult<Exchange> {
        self.exchanges
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::ExchangeNotFound(id.to_string()))
    }

    async fn search_exchanges(&self, query: &ExchangeQuery) -> CoreResult<Vec<Exchange>> {
        let exchanges = self.exchanges.read();
        Ok(query.apply(exchanges.values().cloned()))
    }

    async fn touch_exchange(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        let mut exchanges = self.exchanges.write();
        let exchange = exchanges
            .get_mut(id)
            .ok_or_else(|| CoreError::ExchangeNotFound(id.to_string()))?;
        if exchange.is_running() {
            exchange.touch(at);
        }
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn save_application(&self, app: &Application) -> CoreResult<()> {
        self.apps.write().insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn get_application(&self, id: &str) -> CoreResult<Application> {
        self.apps
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::ApplicationNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeStatus;
    use crate::module::{Module, Technology};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let mut exchange = Exchange::new("app-1", "u1", "build a todo list", true);
        exchange.start_task("m1", "backend").start_attempt();
        store.save_exchange(&exchange).await.unwrap();

        let loaded = store.get_exchange(&exchange.id).await.unwrap();
        assert_eq!(loaded.requirement, "build a todo list");
        assert_eq!(loaded.tasks[0].attempts.len(), 1);
        assert!(temp
            .path()
            .join(".forge/exchanges")
            .join(format!("{}.json", exchange.id))
            .exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_exchange() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        assert!(matches!(
            store.get_exchange("nope").await,
            Err(CoreError::ExchangeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_filters_running_by_application() {
        let store = MemoryStore::new();
        let running = Exchange::new("app-1", "u1", "a", true);
        let mut done = Exchange::new("app-1", "u1", "b", false);
        done.transition(ExchangeStatus::Failed).unwrap();
        let other = Exchange::new("app-2", "u1", "c", true);
        for e in [&running, &done, &other] {
            store.save_exchange(e).await.unwrap();
        }

        let found = store
            .search_exchanges(&ExchangeQuery::new().application("app-1").running())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, running.id);

        let all = store
            .search_exchanges(&ExchangeQuery::new().application("app-1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_touch_only_advances_running() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let exchange = Exchange::new("app-1", "u1", "a", true);
        store.save_exchange(&exchange).await.unwrap();

        let later = exchange.heartbeat_at + chrono::Duration::seconds(30);
        store.touch_exchange(&exchange.id, later).await.unwrap();
        assert_eq!(store.get_exchange(&exchange.id).await.unwrap().heartbeat_at, later);
    }

    #[tokio::test]
    async fn test_application_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let app = Application::new("shop", "u1").with_module(Module::new("web", Technology::Web));
        store.save_application(&app).await.unwrap();

        let loaded = store.get_application(&app.id).await.unwrap();
        assert_eq!(loaded.modules.len(), 1);
        assert_eq!(loaded.modules[0].technology, Technology::Web);
    }
}
