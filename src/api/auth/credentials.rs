use super::auth::{authenticate_via_browser, AuthTokens};
use super::refresh::exchange_refresh_token;
use super::secrets::ClientSecrets;
use crate::db::{current_timestamp_millis, AuthTokenRecord, Storage};
use crate::error::AuthError;
use tracing::{debug, info};

/// 只读写自己创建或打开的文件所需的最小权限。
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// 提前一分钟视为过期，避免令牌在第一批请求途中失效。
const EXPIRY_SKEW_MILLIS: i64 = 60_000;

/// 构造后不可变的凭据快照。刷新只会产生新的快照，不会修改已经分发给 worker 的副本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub expiry_millis: Option<i64>,
}

impl CredentialSnapshot {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expiry_millis
            .map(|expiry| now_millis + EXPIRY_SKEW_MILLIS >= expiry)
            .unwrap_or(false)
    }
}

/// 负责在进程启动时加载（必要时刷新或重新授权）用户凭据，并把结果写回本地存储。
pub struct CredentialStore {
    storage: Storage,
    secrets: ClientSecrets,
    scopes: Vec<String>,
    allow_interactive: bool,
}

impl CredentialStore {
    pub fn new(storage: Storage, secrets: ClientSecrets, scopes: Vec<String>) -> Self {
        Self {
            storage,
            secrets,
            scopes,
            allow_interactive: true,
        }
    }

    pub fn allow_interactive(mut self, allow: bool) -> Self {
        self.allow_interactive = allow;
        self
    }

    /// 每次运行只应调用一次，且必须在任何 worker 启动之前。
    pub fn load_or_refresh(&self) -> Result<CredentialSnapshot, AuthError> {
        let record = self
            .storage
            .load_auth_record()
            .map_err(AuthError::Storage)?
            .filter(|record| record.client_id == self.secrets.client_id);

        if let Some(record) = record {
            let snapshot = self.snapshot_from_record(&record);
            if !snapshot.is_expired_at(current_timestamp_millis()) {
                debug!("using stored access token");
                return Ok(snapshot);
            }
            if let Some(refresh_token) = record.refresh_token.as_deref() {
                info!("access token expired; refreshing");
                let tokens = exchange_refresh_token(
                    &self.secrets.token_uri,
                    &self.secrets.client_id,
                    self.secrets.client_secret.as_deref(),
                    refresh_token,
                )?;
                return self.persist(&tokens);
            }
        }

        if !self.allow_interactive {
            return Err(AuthError::MissingCredential);
        }
        let tokens = authenticate_via_browser(&self.secrets, &self.scopes)?;
        self.persist(&tokens)
    }

    fn persist(&self, tokens: &AuthTokens) -> Result<CredentialSnapshot, AuthError> {
        let record = AuthTokenRecord::new(
            self.secrets.client_id.clone(),
            tokens.access_token.clone(),
            tokens.refresh_token.clone(),
            tokens.expires_in,
            tokens.scope.clone(),
            tokens.token_type.clone(),
        );
        self.storage
            .upsert_auth_record(&record)
            .map_err(AuthError::Storage)?;
        Ok(self.snapshot_from_record(&record))
    }

    fn snapshot_from_record(&self, record: &AuthTokenRecord) -> CredentialSnapshot {
        let scopes = record
            .scope
            .as_deref()
            .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| self.scopes.clone());
        CredentialSnapshot {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            token_endpoint: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scopes,
            expiry_millis: record.expires_at_millis(),
        }
    }
}
