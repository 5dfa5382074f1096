use super::{
    client::{error_from_response, map_send_error, parse_json, DriveSession},
    models::{ChunkStatus, DriveFileDto, FileMetadata, RemoteFile, UploadSession},
};
use crate::error::ApiError;
use reqwest::blocking::Response;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use serde_json::json;

/// 上传完成时需要服务端返回的字段。
const UPLOAD_RESPONSE_FIELDS: &str = "id, name, parents, mimeType, size, webViewLink";
const RESUME_INCOMPLETE: u16 = 308;

impl DriveSession {
    pub(super) fn start_resumable(&self, metadata: &FileMetadata) -> Result<UploadSession, ApiError> {
        let url = format!("{}/files", self.endpoints.upload_base);
        let body = json!({
            "name": metadata.name,
            "parents": [metadata.parent_id],
        });
        let mut request = self
            .authorized(self.client.post(url))
            .query(&[("uploadType", "resumable"), ("fields", UPLOAD_RESPONSE_FIELDS)])
            .header("X-Upload-Content-Length", metadata.size.to_string())
            .json(&body);
        if let Some(mime) = metadata.mime_type.as_deref() {
            request = request.header("X-Upload-Content-Type", mime);
        }

        let response = request
            .send()
            .map_err(|e| map_send_error("failed to start resumable upload", e))?;
        if !response.status().is_success() {
            return Err(error_from_response("resumable upload initiation failed", response));
        }

        let uri = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::transport("resumable upload response has no Location header"))?;

        Ok(UploadSession {
            uri,
            total_bytes: metadata.size,
        })
    }

    pub(super) fn put_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        bytes: &[u8],
    ) -> Result<ChunkStatus, ApiError> {
        let response = self
            .authorized(self.client.put(&session.uri))
            .header(CONTENT_LENGTH, bytes.len().to_string())
            .header(CONTENT_RANGE, content_range(offset, bytes.len() as u64, session.total_bytes))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .map_err(|e| map_send_error("failed to send chunk", e))?;
        chunk_status_from_response(response)
    }

    pub(super) fn probe_status(&self, session: &UploadSession) -> Result<ChunkStatus, ApiError> {
        let response = self
            .authorized(self.client.put(&session.uri))
            .header(CONTENT_LENGTH, "0")
            .header(CONTENT_RANGE, format!("bytes */{}", session.total_bytes))
            .send()
            .map_err(|e| map_send_error("failed to query upload status", e))?;
        chunk_status_from_response(response)
    }
}

fn chunk_status_from_response(response: Response) -> Result<ChunkStatus, ApiError> {
    let status = response.status().as_u16();
    if status == RESUME_INCOMPLETE {
        let received = response
            .headers()
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .map(parse_received_bytes)
            .transpose()?
            .unwrap_or(0);
        return Ok(ChunkStatus::Incomplete { received });
    }
    if response.status().is_success() {
        let dto: DriveFileDto = parse_json("upload completion", response)?;
        return Ok(ChunkStatus::Complete(RemoteFile::from(dto)));
    }
    Err(error_from_response("chunk upload failed", response))
}

/// `bytes a-b/total`；零字节文件只能用 `bytes */0` 收尾。
pub(super) fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// 解析 308 响应的 `Range: bytes=0-N`，返回已持久化的字节数 N+1。
pub(super) fn parse_received_bytes(header: &str) -> Result<u64, ApiError> {
    let malformed = || ApiError::transport(format!("malformed Range header: {header}"));
    let range = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    let (_, last) = range.split_once('-').ok_or_else(malformed)?;
    let last: u64 = last.trim().parse().map_err(|_| malformed())?;
    Ok(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::drive::{DriveApi, DriveEndpoints};
    use crate::test_support::{test_credentials, CannedResponse, ScriptedServer};
    use std::time::Duration;

    fn session(server: &ScriptedServer) -> DriveSession {
        DriveSession::connect(
            test_credentials(),
            DriveEndpoints::with_origin(&server.base_url),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn content_range_formats() {
        assert_eq!(content_range(0, 10, 25), "bytes 0-9/25");
        assert_eq!(content_range(20, 5, 25), "bytes 20-24/25");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn range_header_reports_next_offset() {
        assert_eq!(parse_received_bytes("bytes=0-524287").unwrap(), 524_288);
        assert!(parse_received_bytes("items=0-1").is_err());
        assert!(parse_received_bytes("bytes=0-").is_err());
    }

    #[test]
    fn full_resumable_exchange() {
        let server = ScriptedServer::spawn(vec![
            CannedResponse::empty("HTTP/1.1 200 OK")
                .with_header("Location", "{base}/upload/session-1"),
            CannedResponse::empty("HTTP/1.1 308 Resume Incomplete")
                .with_header("Range", "bytes=0-3"),
            CannedResponse::empty("HTTP/1.1 308 Resume Incomplete")
                .with_header("Range", "bytes=0-3"),
            CannedResponse::json(
                "HTTP/1.1 200 OK",
                r#"{"id":"file-9","name":"clip.mp4","size":"6","parents":["p"],"webViewLink":"https://drive.example/file-9"}"#,
            ),
        ]);
        let mut drive = session(&server);
        let metadata = FileMetadata {
            name: "clip.mp4".to_string(),
            parent_id: "p".to_string(),
            size: 6,
            mime_type: Some("video/mp4".to_string()),
        };

        let upload = drive.create_resumable_upload(&metadata).unwrap();
        assert_eq!(upload.uri, format!("{}/upload/session-1", server.base_url));
        let first = drive.send_chunk(&upload, 0, b"abcd").unwrap();
        let probed = drive.query_upload_status(&upload).unwrap();
        let last = drive.send_chunk(&upload, 4, b"ef").unwrap();
        let requests = server.finish();

        assert_eq!(first, ChunkStatus::Incomplete { received: 4 });
        assert_eq!(probed, ChunkStatus::Incomplete { received: 4 });
        match last {
            ChunkStatus::Complete(file) => {
                assert_eq!(file.id, "file-9");
                assert_eq!(file.size, Some(6));
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert!(requests[0].starts_with("POST /upload/drive/v3/files?uploadType=resumable"));
        assert!(requests[0].to_ascii_lowercase().contains("x-upload-content-length: 6"));
        assert!(requests[1].to_ascii_lowercase().contains("content-range: bytes 0-3/6"));
        assert!(requests[2].to_ascii_lowercase().contains("content-range: bytes */6"));
        assert!(requests[3].to_ascii_lowercase().contains("content-range: bytes 4-5/6"));
        assert!(requests[3].ends_with("ef"));
    }

    #[test]
    fn resume_incomplete_without_range_means_nothing_persisted() {
        let server = ScriptedServer::spawn(vec![CannedResponse::empty(
            "HTTP/1.1 308 Resume Incomplete",
        )]);
        let mut drive = session(&server);
        let upload = UploadSession {
            uri: format!("{}/upload/session-1", server.base_url),
            total_bytes: 4,
        };

        let status = drive.send_chunk(&upload, 0, b"abcd").unwrap();
        server.finish();

        assert_eq!(status, ChunkStatus::Incomplete { received: 0 });
    }

    #[test]
    fn server_error_on_chunk_is_transient() {
        let server = ScriptedServer::spawn(vec![CannedResponse::json(
            "HTTP/1.1 503 Service Unavailable",
            r#"{"error":{"code":503,"message":"Backend Error"}}"#,
        )]);
        let mut drive = session(&server);
        let upload = UploadSession {
            uri: format!("{}/upload/session-1", server.base_url),
            total_bytes: 4,
        };

        let err = drive.send_chunk(&upload, 0, b"abcd").unwrap_err();
        server.finish();

        assert_eq!(err.status, Some(503));
        assert!(err.is_transient());
    }
}
