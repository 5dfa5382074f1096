use crate::error::ConfigError;
use crate::settings::default_upload_concurrency;
use crate::upload_manager::engine::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES};
use crate::upload_manager::{RetryPolicy, UploadEngine};
use std::time::Duration;

/// 断点续传要求除最后一片外的分片大小是 256 KiB 的整数倍。
pub const CHUNK_GRANULARITY: usize = 256 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// 一次上传运行的参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadConfig {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_upload_concurrency(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy {
                max_retries: DEFAULT_MAX_RETRIES,
                ..RetryPolicy::default()
            },
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.chunk_size == 0 || self.chunk_size % CHUNK_GRANULARITY != 0 {
            return Err(ConfigError::ChunkSize {
                value: self.chunk_size,
                granularity: CHUNK_GRANULARITY,
            });
        }
        if self.retry.max_backoff < self.retry.initial_backoff {
            return Err(ConfigError::BackoffRange);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// 分片大小以 MiB 指定，溢出时视为无效。
    pub fn with_chunk_size_mib(mut self, mib: usize) -> Result<Self, ConfigError> {
        self.chunk_size = mib.checked_mul(1024 * 1024).ok_or_else(|| {
            ConfigError::Invalid(format!("chunk size of {mib} MiB is too large"))
        })?;
        Ok(self)
    }

    pub fn engine(&self) -> UploadEngine {
        UploadEngine::new(self.chunk_size, self.retry.clone())
    }
}
