mod client;
mod folders;
pub mod models;
mod upload;

pub use client::{DriveEndpoints, DriveSession};
pub use models::{ChunkStatus, FileMetadata, FolderEntry, RemoteFile, UploadSession};

use crate::error::ApiError;

pub(crate) const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub(crate) const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub(crate) const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// 编排层所依赖的远端存储操作。
/// 每个实现实例只属于一个 worker，因此方法都取 `&mut self`。
pub trait DriveApi {
    /// 查找未进回收站、名称完全一致的文件夹；顺序由远端决定。
    fn list_folders(&mut self, name: &str) -> Result<Vec<FolderEntry>, ApiError>;

    /// 创建文件夹并返回其 ID。
    fn create_folder(&mut self, name: &str) -> Result<String, ApiError>;

    fn create_resumable_upload(&mut self, metadata: &FileMetadata) -> Result<UploadSession, ApiError>;

    /// 从 `offset` 开始发送一片数据。空切片表示零字节文件的收尾请求。
    fn send_chunk(
        &mut self,
        session: &UploadSession,
        offset: u64,
        bytes: &[u8],
    ) -> Result<ChunkStatus, ApiError>;

    /// 询问服务端已经持久化了多少字节，用于失败后的断点续传。
    fn query_upload_status(&mut self, session: &UploadSession) -> Result<ChunkStatus, ApiError>;
}
