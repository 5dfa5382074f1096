mod auth;
mod settings;

pub use auth::AuthTokenRecord;

use directories::ProjectDirs;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "drivelift";
const APPLICATION: &str = "drivelift";
const DB_FILE_NAME: &str = "state.db";

pub type StorageResult<T> = Result<T, String>;

/// 本地持久化入口：令牌与设置共用同一个 SQLite 文件。
/// 每次操作都打开一个短连接，进程内没有共享的数据库句柄。
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let storage = Self { path: path.into() };
        storage.with_connection(|_| Ok(()))?;
        Ok(storage)
    }

    pub fn open_default() -> StorageResult<Self> {
        Self::open(default_database_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_connection<T, F>(&self, operation: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.open_connection()?;
        operation(&conn)
    }

    fn open_connection(&self) -> StorageResult<Connection> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("failed to create database directory {dir:?}: {e}"))?;
            }
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| format!("failed to open SQLite database: {e}"))?;
        apply_migrations(&conn)?;
        Ok(conn)
    }
}

fn apply_migrations(conn: &Connection) -> StorageResult<()> {
    let schema = [auth::AUTH_TABLE_SCHEMA, settings::SETTINGS_TABLE_SCHEMA].join("\n");
    conn.execute_batch(&schema)
        .map_err(|e| format!("failed to initialize database schema: {e}"))?;
    Ok(())
}

/// 平台默认数据目录下的数据库路径。
pub fn default_database_path() -> StorageResult<PathBuf> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| "failed to resolve application data directory".to_string())?;
    Ok(dirs.data_dir().join(DB_FILE_NAME))
}

pub(crate) fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
