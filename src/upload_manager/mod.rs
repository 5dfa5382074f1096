pub mod core;
pub mod engine;
pub mod folder;
pub mod report;
pub mod scanner;
pub mod session;
pub mod types;

pub use core::{UploadManager, COORDINATOR_WORKER};
pub use engine::{guess_mime_type, RetryPolicy, Sleeper, ThreadSleeper, UploadEngine};
pub use folder::{FolderResolver, FolderTarget};
pub use report::BatchReport;
pub use scanner::{collect_files, FileFilter, ScanOptions};
pub use session::{HttpSessionFactory, SessionFactory, SessionProvider, WorkerSession};
pub use types::{UploadProgress, UploadResult, UploadTask};
