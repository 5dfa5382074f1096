use crate::error::AuthError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth 客户端配置，来自 Google Cloud Console 下载的 client secrets 文件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: Option<SecretsBody>,
    web: Option<SecretsBody>,
}

#[derive(Debug, Deserialize)]
struct SecretsBody {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let raw = fs::read_to_string(path).map_err(|e| AuthError::ClientSecrets {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw).map_err(|reason| AuthError::ClientSecrets {
            path: path.display().to_string(),
            reason,
        })
    }

    /// 同时支持 "installed"（桌面应用）与 "web" 两种外层结构。
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let file: SecretsFile =
            serde_json::from_str(raw).map_err(|e| format!("invalid client secrets JSON: {e}"))?;
        let body = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())?;
        if body.client_id.trim().is_empty() {
            return Err("client_id cannot be empty".to_string());
        }
        Ok(Self {
            client_id: body.client_id,
            client_secret: body.client_secret.filter(|s| !s.is_empty()),
            auth_uri: body.auth_uri.unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: body.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}
