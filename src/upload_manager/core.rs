use super::engine::UploadEngine;
use super::folder::{FolderResolver, FolderTarget};
use super::report::BatchReport;
use super::scanner::{collect_files, ScanOptions};
use super::session::{SessionFactory, SessionProvider, WorkerSession};
use super::types::{UploadResult, UploadTask};
use crate::error::{BatchError, FolderResolutionError, TransferError};
use std::{
    any::Any,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc, Mutex, MutexGuard},
    thread,
};
use tracing::{debug, error, info};

/// 解析目标文件夹所用的协调者会话编号；上传 worker 从 1 开始编号。
pub const COORDINATOR_WORKER: usize = 0;

/// 批量上传的调度者：先串行解析目标文件夹，再把任务分发给固定数量的 worker。
pub struct UploadManager<F: SessionFactory> {
    provider: SessionProvider<F>,
    engine: UploadEngine,
    concurrency: usize,
    resolver: FolderResolver,
}

impl<F: SessionFactory> UploadManager<F> {
    pub fn new(provider: SessionProvider<F>, engine: UploadEngine, concurrency: usize) -> Self {
        Self {
            provider,
            engine,
            concurrency: concurrency.max(1),
            resolver: FolderResolver::new(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn engine(&self) -> &UploadEngine {
        &self.engine
    }

    /// 扫描、解析目标文件夹并上传。没有候选文件时不会触碰远端。
    pub fn run(
        &self,
        source: &Path,
        options: &ScanOptions,
        target: &FolderTarget,
    ) -> Result<BatchReport, BatchError> {
        let files = collect_files(source, options).map_err(|source_err| BatchError::Scan {
            path: source.display().to_string(),
            source: source_err,
        })?;
        if files.is_empty() {
            info!(source = %source.display(), "no matching files to upload");
            return Ok(BatchReport::new());
        }
        info!(source = %source.display(), count = files.len(), "found files to upload");

        let folder_id = self.resolve_destination(target)?;
        Ok(self.run_batch(files, &folder_id))
    }

    /// 在协调者会话上解析目标文件夹；必须在任何 worker 启动之前完成。
    pub fn resolve_destination(&self, target: &FolderTarget) -> Result<String, BatchError> {
        let name = match target {
            FolderTarget::Id(id) => return Ok(id.clone()),
            FolderTarget::Name(name) => name,
        };
        let mut slot = self.provider.for_worker(COORDINATOR_WORKER);
        let api = slot.get().map_err(|source| FolderResolutionError {
            name: name.clone(),
            source,
        })?;
        Ok(self.resolver.resolve_name(api, name)?)
    }

    /// 把文件按路径排序后入队，由 `min(concurrency, 文件数)` 个 worker 消费。
    /// 单个任务的失败或崩溃只影响它自己的结果；每个任务恰好产生一条结果。
    pub fn run_batch(&self, files: Vec<PathBuf>, destination_folder_id: &str) -> BatchReport {
        let mut tasks: Vec<UploadTask> = files
            .into_iter()
            .map(|path| UploadTask::new(path, destination_folder_id))
            .collect();
        tasks.sort_by(|a, b| a.local_path.cmp(&b.local_path));

        let mut report = BatchReport::new();
        if tasks.is_empty() {
            return report;
        }

        let workers = self.concurrency.min(tasks.len());
        info!(
            files = tasks.len(),
            workers,
            folder = destination_folder_id,
            "starting upload batch"
        );
        let queue = Mutex::new(VecDeque::from(tasks));
        let (tx, rx) = mpsc::channel::<UploadResult>();

        thread::scope(|scope| {
            for worker_id in 1..=workers {
                let results = tx.clone();
                let queue = &queue;
                let spawned = thread::Builder::new()
                    .name(format!("drive-up-{worker_id}"))
                    .spawn_scoped(scope, move || self.worker_loop(worker_id, queue, results));
                if let Err(err) = spawned {
                    error!(worker = worker_id, "failed to spawn upload worker: {err}");
                }
            }
            drop(tx);
            for result in rx {
                report.record(result);
            }
        });

        // worker 全部无法启动时，剩余任务仍要有结果
        let leftover: Vec<UploadTask> = recover_lock(&queue).drain(..).collect();
        for task in leftover {
            let err = TransferError::NotStarted("no upload worker was available".to_string());
            report.record(UploadResult::failure(&task, &err));
        }

        info!("{}", report.summary_line());
        report
    }

    fn worker_loop(
        &self,
        worker_id: usize,
        queue: &Mutex<VecDeque<UploadTask>>,
        results: mpsc::Sender<UploadResult>,
    ) {
        let mut session = self.provider.for_worker(worker_id);
        loop {
            let next = recover_lock(queue).pop_front();
            let Some(task) = next else { break };
            debug!(worker = worker_id, file = %task.display_name, "picked up task");

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_task(&mut session, &task)));
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    // 会话状态不可信，下个任务重新建立
                    session.reset();
                    let err = TransferError::Panicked(panic_message(payload.as_ref()));
                    error!(worker = worker_id, file = %task.display_name, "{err}");
                    UploadResult::failure(&task, &err)
                }
            };
            if results.send(result).is_err() {
                break;
            }
        }
        debug!(worker = worker_id, "queue drained; worker exiting");
    }

    fn run_task(&self, session: &mut WorkerSession<'_, F>, task: &UploadTask) -> UploadResult {
        match session.get() {
            Ok(api) => self.engine.upload(api, task),
            Err(err) => UploadResult::failure(task, &TransferError::Rejected(err)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn recover_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}
