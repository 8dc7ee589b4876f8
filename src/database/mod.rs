//! llm 日志数据库
//!
//! 对话、响应和待开始请求都保存在同一个 SQLite 文件里。所有访问通过
//! [`LogDatabase`] 句柄进行：
//! - `execute_fn` 用于读取
//! - `execute_write_fn` 是唯一的写入入口，在事务中执行并与其他访问串行化
//!
//! 两者都在 tokio 的阻塞线程池中运行，不会阻塞事件循环。

pub mod dao;
pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 共享的数据库连接
pub type DbConnection = Arc<Mutex<Connection>>;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 挂载的日志数据库句柄
#[derive(Clone)]
pub struct LogDatabase {
    name: String,
    path: PathBuf,
    conn: DbConnection,
}

impl std::fmt::Debug for LogDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDatabase")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl LogDatabase {
    /// 数据源名称
    pub const NAME: &'static str = "llm";

    /// 打开（必要时创建）数据库文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            name: Self::NAME.to_string(),
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 仅当文件已存在时挂载
    pub fn attach_if_exists(path: impl AsRef<Path>) -> Result<Option<Self>, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("[DB] 日志数据库不存在，跳过挂载: {:?}", path);
            return Ok(None);
        }
        let db = Self::open(path)?;
        tracing::info!("[DB] Attached database '{}' from {:?}", db.name, path);
        Ok(Some(db))
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            name: Self::NAME.to_string(),
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 在阻塞线程池中执行只读操作
    pub async fn execute_fn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await?
    }

    /// 唯一的写入入口
    ///
    /// 闭包在事务中执行，返回错误时回滚。
    pub async fn execute_write_fn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await?
    }

    /// 同步版本的读取，供 CLI 使用
    pub fn execute_blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }
}
