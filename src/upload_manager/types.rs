use crate::api::drive::RemoteFile;
use crate::error::{ErrorKind, TransferError};
use std::path::PathBuf;
use std::time::Duration;

/// 一个待上传文件；入队后不再修改，只会被一个 worker 消费一次。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub display_name: String,
    pub destination_folder_id: String,
}

impl UploadTask {
    /// 展示名取文件名本身，不带目录。
    pub fn new(local_path: PathBuf, destination_folder_id: impl Into<String>) -> Self {
        let display_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| local_path.to_string_lossy().into_owned());
        Self {
            local_path,
            display_name,
            destination_folder_id: destination_folder_id.into(),
        }
    }
}

/// 单次上传过程中的瞬时状态，只活在引擎的一次调用里。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub chunk_cursor: u64,
    pub attempt_count: u32,
    pub backoff: Duration,
}

impl UploadProgress {
    pub fn new(total_bytes: u64, initial_backoff: Duration) -> Self {
        Self {
            bytes_sent: 0,
            total_bytes,
            chunk_cursor: 0,
            attempt_count: 0,
            backoff: initial_backoff,
        }
    }

    pub fn percent(&self) -> u32 {
        if self.total_bytes == 0 {
            return 100;
        }
        ((self.bytes_sent.min(self.total_bytes) as u128 * 100) / self.total_bytes as u128) as u32
    }
}

/// 每个任务恰好产生一个结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadResult {
    Success {
        remote_file_id: String,
        remote_link: Option<String>,
        name: String,
    },
    Failure {
        name: String,
        error_kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },
}

impl UploadResult {
    pub fn success(task: &UploadTask, file: RemoteFile) -> Self {
        UploadResult::Success {
            remote_file_id: file.id,
            remote_link: file.web_view_link,
            name: task.display_name.clone(),
        }
    }

    pub fn failure(task: &UploadTask, err: &TransferError) -> Self {
        UploadResult::Failure {
            name: task.display_name.clone(),
            error_kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            UploadResult::Success { name, .. } | UploadResult::Failure { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success { .. })
    }

    /// 面向用户的单行结果描述。
    pub fn outcome_line(&self) -> String {
        match self {
            UploadResult::Success {
                remote_file_id,
                remote_link,
                name,
            } => format!(
                "Uploaded: {name} -> fileId={remote_file_id} | {}",
                remote_link.as_deref().unwrap_or("(no link)")
            ),
            UploadResult::Failure {
                name,
                error_kind,
                message,
                ..
            } => format!("FAILED: {name} -> [{error_kind}] {message}"),
        }
    }
}
