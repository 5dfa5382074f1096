use super::{
    client::{error_from_response, map_send_error, parse_json, DriveSession},
    models::{FileListResponse, FolderDto, FolderEntry},
    FOLDER_MIME_TYPE,
};
use crate::error::ApiError;
use serde_json::json;

/// 名称查询只取前 10 条；调用方只关心第一条匹配。
const FOLDER_PAGE_SIZE: &str = "10";

impl DriveSession {
    pub(super) fn find_folders(&self, name: &str) -> Result<Vec<FolderEntry>, ApiError> {
        let url = format!("{}/files", self.endpoints.api_base);
        let query = folder_query(name);
        let response = self
            .authorized(self.client.get(url))
            .query(&[
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "files(id, name)"),
                ("pageSize", FOLDER_PAGE_SIZE),
            ])
            .header("Accept", "application/json")
            .send()
            .map_err(|e| map_send_error("failed to list folders", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("folder listing failed", response));
        }

        let payload: FileListResponse = parse_json("folder listing", response)?;
        Ok(payload.files.into_iter().map(FolderEntry::from).collect())
    }

    pub(super) fn insert_folder(&self, name: &str) -> Result<String, ApiError> {
        let url = format!("{}/files", self.endpoints.api_base);
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        let response = self
            .authorized(self.client.post(url))
            .query(&[("fields", "id, name")])
            .json(&body)
            .send()
            .map_err(|e| map_send_error("failed to create folder", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("folder creation failed", response));
        }

        let created: FolderDto = parse_json("folder creation", response)?;
        Ok(created.id)
    }
}

/// 构造 Drive 查询表达式；名称中的单引号需要转义。
pub(super) fn folder_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("mimeType='{FOLDER_MIME_TYPE}' and name='{escaped}' and trashed=false")
}
