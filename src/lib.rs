//! 批量断点续传上传到 Google Drive：凭据加载、目标文件夹解析、并发分片上传与结果汇总。

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod settings;
pub mod upload_manager;

#[cfg(test)]
mod test_support;

pub use config::UploadConfig;
pub use error::{ApiError, BatchError, ErrorKind};
pub use upload_manager::{BatchReport, FolderTarget, UploadManager, UploadResult};
