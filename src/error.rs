use std::fmt;

/// 远端 API 中会被视为瞬时错误的状态码：限流、超时与服务端过载。
pub const TRANSIENT_STATUS_CODES: [u16; 7] = [403, 408, 429, 500, 502, 503, 504];

/// 批处理中出现的错误类别，与最终报告里的失败分类一一对应。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    FolderResolution,
    /// 只出现在引擎的重试日志里；重试用尽后归为 `PermanentTransfer`。
    TransientTransfer,
    PermanentTransfer,
    PartialBatchFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Auth => "AuthError",
            ErrorKind::FolderResolution => "FolderResolutionError",
            ErrorKind::TransientTransfer => "TransientTransferError",
            ErrorKind::PermanentTransfer => "PermanentTransferError",
            ErrorKind::PartialBatchFailure => "PartialBatchFailure",
        };
        f.write_str(label)
    }
}

/// 远端存储适配层统一抛出的错误。
/// 状态码的解析全部在适配层完成，重试逻辑只看 `status` 字段。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", render_api_error(.status, .message))]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    /// 没有 HTTP 状态码的错误（连接失败、响应无法解析等）。
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn is_transient(&self) -> bool {
        self.status
            .map(|code| TRANSIENT_STATUS_CODES.contains(&code))
            .unwrap_or(false)
    }
}

fn render_api_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {code}: {message}"),
        None => message.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to read client secrets {path}: {reason}")]
    ClientSecrets { path: String, reason: String },

    #[error("no stored credential available; interactive sign-in is required")]
    MissingCredential,

    #[error("token refresh rejected: {0}")]
    RefreshDenied(String),

    #[error("interactive authorization failed: {0}")]
    Interactive(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

#[derive(Debug, thiserror::Error)]
#[error("failed to resolve destination folder '{name}': {source}")]
pub struct FolderResolutionError {
    pub name: String,
    #[source]
    pub source: ApiError,
}

/// 单个文件上传过程中的终止性错误，在任务边界被转换为 `UploadResult::Failure`。
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("rejected by remote: {0}")]
    Rejected(ApiError),

    #[error("gave up after {attempts} retries: {last}")]
    RetriesExhausted { attempts: u32, last: ApiError },

    #[error("upload protocol error: {0}")]
    Protocol(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("task was never started: {0}")]
    NotStarted(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PermanentTransfer
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::Rejected(err) => err.status,
            TransferError::RetriesExhausted { last, .. } => last.status,
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("chunk size must be a positive multiple of {granularity} bytes (got {value})")]
    ChunkSize { value: usize, granularity: usize },

    #[error("max backoff must not be smaller than the initial backoff")]
    BackoffRange,

    #[error("{0}")]
    Invalid(String),
}

/// 会直接终止整个批次的错误；只有认证与目标文件夹解析（以及启动前的配置/扫描）属于此类。
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    FolderResolution(#[from] FolderResolutionError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to enumerate {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl BatchError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BatchError::Auth(_) => Some(ErrorKind::Auth),
            BatchError::FolderResolution(_) => Some(ErrorKind::FolderResolution),
            BatchError::Config(_) | BatchError::Scan { .. } => None,
        }
    }
}
