//! 测试用的本地 HTTP 桩：按顺序对每个连接返回一个预设响应，并记录请求原文。

use crate::api::drive::{
    ChunkStatus, DriveApi, FileMetadata, FolderEntry, RemoteFile, UploadSession,
};
use crate::error::ApiError;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

pub(crate) struct CannedResponse {
    pub status_line: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl CannedResponse {
    pub fn json(status_line: &'static str, body: &str) -> Self {
        Self {
            status_line,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn empty(status_line: &'static str) -> Self {
        Self {
            status_line,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// 头部值中的 `{base}` 会被替换为桩服务自身的地址。
pub(crate) struct ScriptedServer {
    pub base_url: String,
    handle: thread::JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    pub fn spawn(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");
        let base = base_url.clone();
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for canned in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                let mut head = format!("{}\r\n", canned.status_line);
                for (name, value) in &canned.headers {
                    let value = value.replace("{base}", &base);
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n",
                    canned.body.len()
                ));
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(canned.body.as_bytes()).unwrap();
            }
            requests
        });
        Self { base_url, handle }
    }

    /// 等待所有预设响应发送完毕，返回收到的请求原文。
    pub fn finish(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0_u8; 8192];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if request.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&request).to_string()
}

pub(crate) fn test_credentials() -> crate::api::auth::CredentialSnapshot {
    crate::api::auth::CredentialSnapshot {
        access_token: "test-access-token".to_string(),
        refresh_token: Some("test-refresh-token".to_string()),
        token_endpoint: "http://127.0.0.1:9/token".to_string(),
        client_id: "test-client".to_string(),
        client_secret: None,
        scopes: vec![crate::api::auth::DRIVE_FILE_SCOPE.to_string()],
        expiry_millis: None,
    }
}

/// `FakeDrive::send_chunk` 的脚本步骤；脚本耗尽后默认全部接收。
#[derive(Clone, Debug)]
pub(crate) enum SendStep {
    Accept,
    Fail(ApiError),
    /// 服务端已经持久化到 `persisted` 字节，但请求仍以错误结束。
    FailAfterPersisting { persisted: u64, err: ApiError },
    /// 服务端回复 308 但没有持久化这一片。
    Discard,
}

/// 内存中的远端：记录每一次调用，便于断言重试与续传行为。
#[derive(Default)]
pub(crate) struct FakeDrive {
    pub folders: Vec<FolderEntry>,
    pub folder_creations: usize,
    pub list_error: Option<ApiError>,
    pub init_failures: VecDeque<ApiError>,
    pub initiations: usize,
    pub send_script: VecDeque<SendStep>,
    pub query_failures: VecDeque<ApiError>,
    /// 每次 send_chunk 的 (offset, 字节内容)。
    pub sends: Vec<(u64, Vec<u8>)>,
    pub queries: usize,
    pub uploaded: Vec<u8>,
    received: u64,
    name: String,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn status(&self, total: u64) -> ChunkStatus {
        if self.received >= total {
            ChunkStatus::Complete(RemoteFile {
                id: format!("remote-{}", self.name),
                name: self.name.clone(),
                mime_type: None,
                size: Some(total),
                parents: Vec::new(),
                web_view_link: Some(format!("https://drive.example/{}", self.name)),
            })
        } else {
            ChunkStatus::Incomplete {
                received: self.received,
            }
        }
    }

    fn persist(&mut self, offset: u64, bytes: &[u8], upto: u64) {
        let keep = upto.saturating_sub(offset).min(bytes.len() as u64) as usize;
        self.uploaded.truncate(offset as usize);
        self.uploaded.extend_from_slice(&bytes[..keep]);
        self.received = offset + keep as u64;
    }
}

impl DriveApi for FakeDrive {
    fn list_folders(&mut self, name: &str) -> Result<Vec<FolderEntry>, ApiError> {
        if let Some(err) = self.list_error.clone() {
            return Err(err);
        }
        Ok(self
            .folders
            .iter()
            .filter(|folder| folder.name == name)
            .cloned()
            .collect())
    }

    fn create_folder(&mut self, name: &str) -> Result<String, ApiError> {
        self.folder_creations += 1;
        let id = format!("folder-{}", self.folder_creations);
        self.folders.push(FolderEntry {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    fn create_resumable_upload(&mut self, metadata: &FileMetadata) -> Result<UploadSession, ApiError> {
        self.initiations += 1;
        if let Some(err) = self.init_failures.pop_front() {
            return Err(err);
        }
        self.name = metadata.name.clone();
        self.received = 0;
        self.uploaded.clear();
        Ok(UploadSession {
            uri: format!("fake://{}", metadata.name),
            total_bytes: metadata.size,
        })
    }

    fn send_chunk(
        &mut self,
        session: &UploadSession,
        offset: u64,
        bytes: &[u8],
    ) -> Result<ChunkStatus, ApiError> {
        self.sends.push((offset, bytes.to_vec()));
        match self.send_script.pop_front().unwrap_or(SendStep::Accept) {
            SendStep::Accept => {
                self.persist(offset, bytes, offset + bytes.len() as u64);
                Ok(self.status(session.total_bytes))
            }
            SendStep::Fail(err) => Err(err),
            SendStep::Discard => Ok(self.status(session.total_bytes)),
            SendStep::FailAfterPersisting { persisted, err } => {
                self.persist(offset, bytes, persisted);
                Err(err)
            }
        }
    }

    fn query_upload_status(&mut self, session: &UploadSession) -> Result<ChunkStatus, ApiError> {
        self.queries += 1;
        if let Some(err) = self.query_failures.pop_front() {
            return Err(err);
        }
        Ok(self.status(session.total_bytes))
    }
}

/// 记录每次退避时长而不真正休眠。
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    pub sleeps: std::sync::Mutex<Vec<std::time::Duration>>,
}

impl crate::upload_manager::Sleeper for RecordingSleeper {
    fn sleep(&self, duration: std::time::Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<std::time::Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}
