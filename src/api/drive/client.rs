use super::{
    models::{ChunkStatus, FileMetadata, FolderEntry, UploadSession},
    DriveApi, DRIVE_API_BASE, DRIVE_UPLOAD_BASE,
};
use crate::api::auth::CredentialSnapshot;
use crate::error::ApiError;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::redirect::Policy;
use serde::Deserialize;
use std::time::Duration;

/// Drive API 的两个入口地址，测试或自建代理时可以替换。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// 同一个基地址下同时提供 `/drive/v3` 与 `/upload/drive/v3`。
    pub fn with_origin(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            api_base: format!("{origin}/drive/v3"),
            upload_base: format!("{origin}/upload/drive/v3"),
        }
    }
}

/// 绑定到一份凭据副本的 HTTP 会话，只被一个 worker 持有。
pub struct DriveSession {
    pub(super) client: Client,
    pub(super) credentials: CredentialSnapshot,
    pub(super) endpoints: DriveEndpoints,
}

impl DriveSession {
    pub fn connect(
        credentials: CredentialSnapshot,
        endpoints: DriveEndpoints,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_blocking_client(timeout)?,
            credentials,
            endpoints,
        })
    }

    pub(super) fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.credentials.access_token)
    }
}

impl DriveApi for DriveSession {
    fn list_folders(&mut self, name: &str) -> Result<Vec<FolderEntry>, ApiError> {
        self.find_folders(name)
    }

    fn create_folder(&mut self, name: &str) -> Result<String, ApiError> {
        self.insert_folder(name)
    }

    fn create_resumable_upload(&mut self, metadata: &FileMetadata) -> Result<UploadSession, ApiError> {
        self.start_resumable(metadata)
    }

    fn send_chunk(
        &mut self,
        session: &UploadSession,
        offset: u64,
        bytes: &[u8],
    ) -> Result<ChunkStatus, ApiError> {
        self.put_chunk(session, offset, bytes)
    }

    fn query_upload_status(&mut self, session: &UploadSession) -> Result<ChunkStatus, ApiError> {
        self.probe_status(session)
    }
}

/// 构建带统一超时的阻塞式 HTTP 客户端。
/// 不跟随重定向：断点续传用 308 表示“未完成”，必须原样交给调用方。
pub(crate) fn build_blocking_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .redirect(Policy::none())
        .build()
        .map_err(|e| ApiError::transport(format!("failed to build HTTP client: {e}")))
}

/// 把传输层错误归一化为带状态码的 `ApiError`；超时按 408 处理。
pub(super) fn map_send_error(context: &str, err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::http(408, format!("{context}: request timed out"));
    }
    match err.status() {
        Some(status) => ApiError::http(status.as_u16(), format!("{context}: {err}")),
        None => ApiError::transport(format!("{context}: {err}")),
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: Option<String>,
}

/// 读取失败响应的状态码与错误消息（优先取 Google 错误体里的 message）。
pub(super) fn error_from_response(context: &str, response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    let detail = serde_json::from_str::<GoogleErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    if detail.is_empty() {
        ApiError::http(status, context.to_string())
    } else {
        ApiError::http(status, format!("{context}: {detail}"))
    }
}

pub(super) fn parse_json<T: serde::de::DeserializeOwned>(
    context: &str,
    response: Response,
) -> Result<T, ApiError> {
    response
        .json()
        .map_err(|e| ApiError::transport(format!("failed to parse {context} response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_endpoints_share_base() {
        let endpoints = DriveEndpoints::with_origin("http://127.0.0.1:8080/");
        assert_eq!(endpoints.api_base, "http://127.0.0.1:8080/drive/v3");
        assert_eq!(endpoints.upload_base, "http://127.0.0.1:8080/upload/drive/v3");
    }

    #[test]
    fn default_endpoints_point_at_google() {
        let endpoints = DriveEndpoints::default();
        assert!(endpoints.api_base.starts_with("https://www.googleapis.com/"));
    }
}
