use serde::Deserialize;

/// 远端文件夹列表中的一项。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
}

/// 上传完成后远端返回的文件描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub parents: Vec<String>,
    pub web_view_link: Option<String>,
}

/// 发起断点续传会话时提交的元数据。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub parent_id: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

/// 一次断点续传会话；`uri` 由服务端分配，后续分片都发往这里。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    pub uri: String,
    pub total_bytes: u64,
}

/// 发送分片（或查询进度）后的服务端状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
    /// 服务端已持久化的字节数，下一片从这里继续。
    Incomplete { received: u64 },
    Complete(RemoteFile),
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileListResponse {
    #[serde(default)]
    pub(crate) files: Vec<FolderDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderDto {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
}

impl From<FolderDto> for FolderEntry {
    fn from(value: FolderDto) -> Self {
        FolderEntry {
            id: value.id,
            name: value.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveFileDto {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) mime_type: Option<String>,
    // Drive v3 以字符串形式返回 int64
    pub(crate) size: Option<String>,
    #[serde(default)]
    pub(crate) parents: Vec<String>,
    pub(crate) web_view_link: Option<String>,
}

impl From<DriveFileDto> for RemoteFile {
    fn from(value: DriveFileDto) -> Self {
        RemoteFile {
            id: value.id,
            name: value.name.unwrap_or_else(|| "(untitled)".to_string()),
            mime_type: value.mime_type,
            size: value.size.and_then(|raw| raw.parse().ok()),
            parents: value.parents,
            web_view_link: value.web_view_link,
        }
    }
}
