//! 练习记录存储
//!
//! 只追加：`append_*` 写入一条记录，`list_*` 按团队读取。
//! 存储句柄显式注入给使用方，不存在进程级全局状态。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::attempt::{Attempt, Session};

/// 存储的完整内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Attempt / Session 存储
///
/// 每次追加对单条记录是原子的，不会出现写了一半的记录
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn append_attempt(&self, attempt: Attempt) -> AppResult<()>;

    async fn list_attempts(&self, team_id: &str) -> AppResult<Vec<Attempt>>;

    async fn append_session(&self, session: Session) -> AppResult<()>;

    async fn list_sessions(&self, team_id: &str) -> AppResult<Vec<Session>>;
}

/// 内存存储（测试和单进程场景）
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn append_attempt(&self, attempt: Attempt) -> AppResult<()> {
        self.inner.write().await.attempts.push(attempt);
        Ok(())
    }

    async fn list_attempts(&self, team_id: &str) -> AppResult<Vec<Attempt>> {
        Ok(self
            .inner
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn append_session(&self, session: Session) -> AppResult<()> {
        self.inner.write().await.sessions.push(session);
        Ok(())
    }

    async fn list_sessions(&self, team_id: &str) -> AppResult<Vec<Session>> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.team_id == team_id)
            .cloned()
            .collect())
    }
}

/// 单个 JSON 文件存储
///
/// 文件不存在时视为空；每次写入先写临时文件再 rename，读者不会看到半个文件
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, e: impl std::fmt::Display) -> AppError {
        AppError::store(self.path.display().to_string(), e.to_string())
    }

    async fn read_snapshot(&self) -> AppResult<StoreSnapshot> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(StoreSnapshot::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| self.store_error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreSnapshot::default()),
            Err(e) => Err(self.store_error(e)),
        }
    }

    async fn write_snapshot(&self, snapshot: &StoreSnapshot) -> AppResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| self.store_error(e))?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| self.store_error(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.store_error(e))?;

        debug!(
            "已写入 {} ({} 条记录, {} 个会话)",
            self.path.display(),
            snapshot.attempts.len(),
            snapshot.sessions.len()
        );
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> AppResult<()>
    where
        F: FnOnce(&mut StoreSnapshot) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.read_snapshot().await?;
        apply(&mut snapshot);
        self.write_snapshot(&snapshot).await
    }
}

#[async_trait]
impl AttemptStore for JsonFileStore {
    async fn append_attempt(&self, attempt: Attempt) -> AppResult<()> {
        self.update(move |s| s.attempts.push(attempt)).await
    }

    async fn list_attempts(&self, team_id: &str) -> AppResult<Vec<Attempt>> {
        let _guard = self.lock.lock().await;
        let snapshot = self.read_snapshot().await?;
        Ok(snapshot
            .attempts
            .into_iter()
            .filter(|a| a.team_id == team_id)
            .collect())
    }

    async fn append_session(&self, session: Session) -> AppResult<()> {
        self.update(move |s| s.sessions.push(session)).await
    }

    async fn list_sessions(&self, team_id: &str) -> AppResult<Vec<Session>> {
        let _guard = self.lock.lock().await;
        let snapshot = self.read_snapshot().await?;
        Ok(snapshot
            .sessions
            .into_iter()
            .filter(|s| s.team_id == team_id)
            .collect())
    }
}
