use rusqlite::{params, OptionalExtension};

use super::{current_timestamp_millis, Storage, StorageResult};

/// 单行令牌表：同一时间只保存一个用户的授权状态。
pub(crate) const AUTH_TABLE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS auth_tokens (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    client_id TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    expires_in_seconds INTEGER,
    scope TEXT,
    token_type TEXT,
    updated_at_millis INTEGER NOT NULL
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenRecord {
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub updated_at_millis: i64,
}

impl AuthTokenRecord {
    pub fn new(
        client_id: String,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_seconds: Option<u64>,
        scope: Option<String>,
        token_type: Option<String>,
    ) -> Self {
        Self {
            client_id,
            access_token,
            refresh_token,
            expires_in_seconds: expires_in_seconds.and_then(|value| value.try_into().ok()),
            scope,
            token_type,
            updated_at_millis: current_timestamp_millis(),
        }
    }

    /// 令牌到期的绝对时间（毫秒）；没有 expires_in 时视为不过期。
    pub fn expires_at_millis(&self) -> Option<i64> {
        self.expires_in_seconds
            .filter(|secs| *secs >= 0)
            .map(|secs| self.updated_at_millis.saturating_add(secs.saturating_mul(1000)))
    }
}

impl Storage {
    pub fn upsert_auth_record(&self, record: &AuthTokenRecord) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO auth_tokens (
                    id,
                    client_id,
                    access_token,
                    refresh_token,
                    expires_in_seconds,
                    scope,
                    token_type,
                    updated_at_millis
                )
                VALUES (1, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    client_id = excluded.client_id,
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_in_seconds = excluded.expires_in_seconds,
                    scope = excluded.scope,
                    token_type = excluded.token_type,
                    updated_at_millis = excluded.updated_at_millis",
                params![
                    record.client_id,
                    record.access_token,
                    record.refresh_token,
                    record.expires_in_seconds,
                    record.scope,
                    record.token_type,
                    record.updated_at_millis,
                ],
            )
            .map_err(|e| format!("failed to upsert auth tokens: {e}"))?;
            Ok(())
        })
    }

    pub fn load_auth_record(&self) -> StorageResult<Option<AuthTokenRecord>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT
                    client_id,
                    access_token,
                    refresh_token,
                    expires_in_seconds,
                    scope,
                    token_type,
                    updated_at_millis
                FROM auth_tokens
                WHERE id = 1",
                [],
                |row| {
                    Ok(AuthTokenRecord {
                        client_id: row.get(0)?,
                        access_token: row.get(1)?,
                        refresh_token: row.get(2)?,
                        expires_in_seconds: row.get(3)?,
                        scope: row.get(4)?,
                        token_type: row.get(5)?,
                        updated_at_millis: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(|e| format!("failed to read auth tokens: {e}"))
        })
    }

    pub fn clear_auth_record(&self) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM auth_tokens WHERE id = 1", [])
                .map_err(|e| format!("failed to clear auth tokens: {e}"))?;
            Ok(())
        })
    }
}
