use super::types::{UploadProgress, UploadResult, UploadTask};
use crate::api::drive::{ChunkStatus, DriveApi, FileMetadata, RemoteFile, UploadSession};
use crate::error::{ApiError, ErrorKind, TransferError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认分片 8 MiB：足以摊薄单次请求开销，失败重发的代价也有上限。
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_RETRIES: u32 = 8;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(32);
/// 断点续传协议中表示“尚未完成”的状态码。
const RESUME_INCOMPLETE: u16 = 308;

/// 瞬时错误的重试上限与指数退避参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// `min(previous * 2, cap)`
    pub fn next_backoff(&self, previous: Duration) -> Duration {
        previous.saturating_mul(2).min(self.max_backoff)
    }
}

/// 退避等待的抽象，测试中替换为只记录时长的实现。
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 驱动单个文件的断点续传直到完成或出现终止性错误。
#[derive(Clone)]
pub struct UploadEngine {
    chunk_size: usize,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl UploadEngine {
    pub fn new(chunk_size: usize, retry: RetryPolicy) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            retry,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 上传一个文件并把所有错误收敛为 `UploadResult`，不会向上抛出。
    pub fn upload<A: DriveApi + ?Sized>(&self, api: &mut A, task: &UploadTask) -> UploadResult {
        match self.transfer(api, task) {
            Ok(file) => {
                info!(
                    file = %task.display_name,
                    remote_id = %file.id,
                    "upload complete"
                );
                UploadResult::success(task, file)
            }
            Err(err) => {
                warn!(file = %task.display_name, "upload failed: {err}");
                UploadResult::failure(task, &err)
            }
        }
    }

    pub fn transfer<A: DriveApi + ?Sized>(
        &self,
        api: &mut A,
        task: &UploadTask,
    ) -> Result<RemoteFile, TransferError> {
        let mut file = File::open(&task.local_path)?;
        let total_bytes = file.metadata()?.len();
        let metadata = FileMetadata {
            name: task.display_name.clone(),
            parent_id: task.destination_folder_id.clone(),
            size: total_bytes,
            mime_type: guess_mime_type(&task.local_path).map(str::to_string),
        };
        let mut progress = UploadProgress::new(total_bytes, self.retry.initial_backoff);

        let session = loop {
            match api.create_resumable_upload(&metadata) {
                Ok(session) => break session,
                Err(err) => self.back_off(&mut progress, task, err)?,
            }
        };
        debug!(file = %task.display_name, total_bytes, "resumable session opened");

        let buffer_len = usize::try_from(total_bytes)
            .unwrap_or(usize::MAX)
            .min(self.chunk_size);
        let mut buffer = vec![0_u8; buffer_len];
        // 失败后先向服务端确认已持久化的偏移，再继续发送
        let mut resync = false;

        loop {
            let offset = progress.bytes_sent;
            let outcome = if resync {
                api.query_upload_status(&session)
            } else {
                let len = self.next_chunk_len(&progress);
                let chunk = &mut buffer[..len];
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(chunk)?;
                api.send_chunk(&session, offset, chunk)
            };

            match outcome {
                Ok(ChunkStatus::Complete(remote)) => return Ok(remote),
                Ok(ChunkStatus::Incomplete { received }) => {
                    self.advance(&mut progress, &session, received, resync, task)?;
                    resync = false;
                }
                Err(err) => {
                    self.back_off(&mut progress, task, err)?;
                    resync = true;
                }
            }
        }
    }

    fn next_chunk_len(&self, progress: &UploadProgress) -> usize {
        let remaining = progress.total_bytes.saturating_sub(progress.bytes_sent);
        usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(self.chunk_size)
    }

    fn advance(
        &self,
        progress: &mut UploadProgress,
        session: &UploadSession,
        received: u64,
        resync: bool,
        task: &UploadTask,
    ) -> Result<(), TransferError> {
        if received > session.total_bytes {
            return Err(TransferError::Protocol(format!(
                "server acknowledged {received} bytes of a {}-byte file",
                session.total_bytes
            )));
        }
        if !resync && received < progress.bytes_sent {
            return Err(TransferError::Protocol(format!(
                "server acknowledged {received} bytes after {} were already confirmed",
                progress.bytes_sent
            )));
        }
        if !resync && received == progress.bytes_sent {
            // 308 且没有持久化任何字节：从同一偏移重发，计入重试次数
            debug!(
                file = %task.display_name,
                received,
                "chunk was not persisted; resending"
            );
            let err = ApiError::new(
                Some(RESUME_INCOMPLETE),
                format!("server persisted nothing past byte {received}"),
            );
            return self.charge_retry(progress, task, err);
        }
        if resync {
            debug!(
                file = %task.display_name,
                received,
                "resuming from server-acknowledged offset"
            );
        } else {
            progress.chunk_cursor += 1;
        }
        progress.bytes_sent = received;
        info!("{}: {}%", task.display_name, progress.percent());
        Ok(())
    }

    /// 瞬时错误且未超过上限时等待后返回 Ok，否则返回终止性错误。
    fn back_off(
        &self,
        progress: &mut UploadProgress,
        task: &UploadTask,
        err: ApiError,
    ) -> Result<(), TransferError> {
        if !err.is_transient() {
            return Err(TransferError::Rejected(err));
        }
        self.charge_retry(progress, task, err)
    }

    /// 消耗一次重试机会并按当前退避时长等待；额度用完时返回 `RetriesExhausted`。
    fn charge_retry(
        &self,
        progress: &mut UploadProgress,
        task: &UploadTask,
        err: ApiError,
    ) -> Result<(), TransferError> {
        if progress.attempt_count >= self.retry.max_retries {
            return Err(TransferError::RetriesExhausted {
                attempts: progress.attempt_count,
                last: err,
            });
        }
        progress.attempt_count += 1;
        let delay = progress.backoff;
        warn!(
            file = %task.display_name,
            kind = %ErrorKind::TransientTransfer,
            status = ?err.status,
            attempt = progress.attempt_count,
            max_retries = self.retry.max_retries,
            backoff_secs = delay.as_secs_f64(),
            "transient error, backing off: {}",
            err.message
        );
        self.sleeper.sleep(delay);
        progress.backoff = self.retry.next_backoff(delay);
        Ok(())
    }
}

/// 按扩展名推断内容类型；未知类型交给服务端自行判断。
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDrive, RecordingSleeper, SendStep};
    use std::collections::VecDeque;
    use std::path::PathBuf;

    fn engine(chunk_size: usize, sleeper: &Arc<RecordingSleeper>) -> UploadEngine {
        UploadEngine::new(chunk_size, RetryPolicy::default()).with_sleeper(sleeper.clone())
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> UploadTask {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        UploadTask::new(path, "dest")
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|v| Duration::from_secs(*v)).collect()
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        let mut current = policy.initial_backoff;
        let mut seen = vec![current];
        for _ in 0..7 {
            current = policy.next_backoff(current);
            seen.push(current);
        }
        assert_eq!(seen, secs(&[1, 2, 4, 8, 16, 32, 32, 32]));
    }

    #[test]
    fn uploads_in_chunks_including_final_partial_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"0123456789");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        let offsets: Vec<(u64, usize)> = drive.sends.iter().map(|(o, b)| (*o, b.len())).collect();
        assert_eq!(offsets, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(drive.uploaded, b"0123456789");
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn retry_exhaustion_follows_backoff_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcdef");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        drive.send_script = (0..20)
            .map(|_| SendStep::Fail(ApiError::http(503, "backend error")))
            .collect();

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert_eq!(sleeper.recorded(), secs(&[1, 2, 4, 8, 16, 32, 32, 32]));
        assert_eq!(drive.sends.len(), 9);
        match result {
            UploadResult::Failure {
                error_kind, status, ..
            } => {
                assert_eq!(error_kind, ErrorKind::PermanentTransfer);
                assert_eq!(status, Some(503));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn non_retryable_status_aborts_without_sleeping() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcdef");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        drive.send_script = VecDeque::from(vec![SendStep::Fail(ApiError::http(400, "bad range"))]);

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(!result.is_success());
        assert_eq!(drive.sends.len(), 1);
        assert_eq!(drive.queries, 0);
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn resumes_from_acknowledged_offset_after_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcdefghij");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        // 第二片发送到一半（已持久化 6 字节）时失败
        drive.send_script = VecDeque::from(vec![
            SendStep::Accept,
            SendStep::FailAfterPersisting {
                persisted: 6,
                err: ApiError::http(502, "bad gateway"),
            },
        ]);

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        let offsets: Vec<u64> = drive.sends.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 4, 6]);
        assert_eq!(drive.sends[2].1, b"ghij");
        assert_eq!(drive.uploaded, b"abcdefghij");
        assert_eq!(drive.queries, 1);
        assert_eq!(sleeper.recorded(), secs(&[1]));
    }

    #[test]
    fn status_query_failures_share_the_retry_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcd");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        drive.send_script = VecDeque::from(vec![SendStep::Fail(ApiError::http(429, "slow down"))]);
        drive.query_failures = VecDeque::from(vec![ApiError::http(500, "oops")]);

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        assert_eq!(drive.queries, 2);
        assert_eq!(sleeper.recorded(), secs(&[1, 2]));
    }

    #[test]
    fn initiation_is_retried_on_transient_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcd");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        drive.init_failures = VecDeque::from(vec![ApiError::http(408, "timeout")]);

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        assert_eq!(drive.initiations, 2);
        assert_eq!(sleeper.recorded(), secs(&[1]));
    }

    #[test]
    fn empty_file_sends_single_empty_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "empty.mp4", b"");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        assert_eq!(drive.sends.len(), 1);
        assert!(drive.sends[0].1.is_empty());
    }

    #[test]
    fn missing_local_file_is_a_permanent_failure() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        let task = UploadTask::new(PathBuf::from("/definitely/missing/clip.mp4"), "dest");

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        match result {
            UploadResult::Failure {
                error_kind, message, ..
            } => {
                assert_eq!(error_kind, ErrorKind::PermanentTransfer);
                assert!(message.starts_with("local I/O error"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(drive.initiations, 0);
    }

    #[test]
    fn unpersisted_chunk_is_resent_from_same_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcdef");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        // 308 without a Range header: nothing persisted
        drive.send_script = VecDeque::from(vec![SendStep::Discard]);

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert!(result.is_success(), "{result:?}");
        let offsets: Vec<u64> = drive.sends.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 0, 4]);
        assert_eq!(drive.uploaded, b"abcdef");
        assert_eq!(drive.queries, 0);
        assert_eq!(sleeper.recorded(), secs(&[1]));
    }

    #[test]
    fn server_that_never_persists_exhausts_retries() {
        let tmp = tempfile::tempdir().unwrap();
        let task = write_file(&tmp, "clip.mp4", b"abcdef");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut drive = FakeDrive::new();
        drive.send_script = (0..20).map(|_| SendStep::Discard).collect();

        let result = engine(4, &sleeper).upload(&mut drive, &task);

        assert_eq!(drive.sends.len(), 9);
        assert_eq!(sleeper.recorded(), secs(&[1, 2, 4, 8, 16, 32, 32, 32]));
        match result {
            UploadResult::Failure {
                error_kind, status, message, ..
            } => {
                assert_eq!(error_kind, ErrorKind::PermanentTransfer);
                assert_eq!(status, Some(308));
                assert!(message.starts_with("gave up after 8 retries"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn mime_guess_is_case_insensitive() {
        assert_eq!(guess_mime_type(Path::new("A.MP4")), Some("video/mp4"));
        assert_eq!(guess_mime_type(Path::new("clip.MOV")), Some("video/quicktime"));
        assert_eq!(guess_mime_type(Path::new("diagram.svg")), Some("image/svg+xml"));
        assert_eq!(guess_mime_type(Path::new("notes")), None);
        assert_eq!(guess_mime_type(Path::new("x.unknownext")), None);
    }
}
