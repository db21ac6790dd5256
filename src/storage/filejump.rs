//! FileJump 网盘 HTTP 客户端

use super::{EntryPage, RemoteEntry, RemoteStorage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// 列表接口的响应
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<RemoteEntry>,
    #[serde(default)]
    next_page: Option<u32>,
}

/// 上传接口的响应
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "fileEntry")]
    file_entry: UploadedEntry,
}

#[derive(Debug, Deserialize)]
struct UploadedEntry {
    id: u64,
}

pub struct FileJumpClient {
    client: Client,
    base_url: String,
    token: String,
    per_page: u32,
    name: String,
}

impl FileJumpClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(IO_TIMEOUT_SECS)))
            .connect_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .build()?;

        let base_url = format!("{}/", config.base_url.trim_end_matches('/'));
        let name = format!("filejump:{}", base_url);

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            per_page: config.per_page,
            name,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// 非 2xx 状态转换为错误
    async fn check(response: Response, what: &str) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(what.to_string()));
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl RemoteStorage for FileJumpClient {
    async fn list_entries(
        &self,
        folder_id: Option<u64>,
        page: u32,
    ) -> Result<EntryPage, RemoteError> {
        let mut query = vec![
            ("perPage", self.per_page.to_string()),
            ("workspaceId", "0".to_string()),
            ("page", page.to_string()),
        ];
        if let Some(id) = folder_id {
            query.push(("parentIds", id.to_string()));
        }

        let response = self
            .request(Method::GET, "drive/file-entries")
            .query(&query)
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .send()
            .await?;
        let response = Self::check(response, &format!("folder {:?}", folder_id)).await?;
        let list: ListResponse = Self::decode(response).await?;

        debug!(
            "列出目录 {:?} 第 {} 页: {} 个条目, 下一页 {:?}",
            folder_id,
            page,
            list.data.len(),
            list.next_page
        );

        Ok(EntryPage {
            entries: list.data,
            next_page: list.next_page,
        })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        target_relative_path: &str,
    ) -> Result<u64, RemoteError> {
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target_relative_path.to_string());

        // 流式读取，避免把大文件整个读入内存
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = multipart::Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new()
            .text("parentId", "null")
            .text("relativePath", target_relative_path.to_string())
            .part("file", part);

        let response = self
            .request(Method::POST, "uploads")
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response, target_relative_path).await?;
        let uploaded: UploadResponse = Self::decode(response).await?;

        debug!("上传完成: {} -> {}", target_relative_path, uploaded.file_entry.id);
        Ok(uploaded.file_entry.id)
    }

    async fn download_file(&self, entry_id: u64) -> Result<Bytes, RemoteError> {
        let response = self
            .request(Method::GET, &format!("file-entries/{}", entry_id))
            .send()
            .await?;
        let response = Self::check(response, &entry_id.to_string()).await?;
        Ok(response.bytes().await?)
    }

    async fn set_metadata(&self, entry_id: u64, metadata: &str) -> Result<(), RemoteError> {
        let response = self
            .request(Method::PUT, &format!("file-entries/{}", entry_id))
            .json(&serde_json::json!({ "description": metadata }))
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .send()
            .await?;
        Self::check(response, &entry_id.to_string()).await?;
        Ok(())
    }

    async fn delete_entries(
        &self,
        entry_ids: &[u64],
        permanent: bool,
    ) -> Result<(), RemoteError> {
        if entry_ids.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::DELETE, "file-entries")
            .json(&serde_json::json!({
                "entryIds": entry_ids,
                "deleteForever": permanent,
            }))
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .send()
            .await?;
        Self::check(response, &format!("{:?}", entry_ids)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_shape() {
        let body = r#"{
            "current_page": 1,
            "next_page": 2,
            "data": [
                {"id": 12, "name": "docs", "type": "folder", "path": "12", "description": null, "file_size": 0},
                {"id": 13, "name": "a.txt", "type": "text", "path": "12/13",
                 "description": "{\"SHA256\":\"abc\"}", "file_size": 10, "parent_id": 12}
            ]
        }"#;
        let list: ListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(list.next_page, Some(2));
        assert_eq!(list.data.len(), 2);
        assert!(list.data[0].is_folder());
        assert_eq!(list.data[1].parent_id(), 12);
    }

    #[test]
    fn test_last_page_has_no_next() {
        let list: ListResponse = serde_json::from_str(r#"{"data": [], "next_page": null}"#).unwrap();
        assert_eq!(list.next_page, None);
    }

    #[test]
    fn test_upload_response_shape() {
        let uploaded: UploadResponse =
            serde_json::from_str(r#"{"status": "success", "fileEntry": {"id": 99, "parent_id": null}}"#)
                .unwrap();
        assert_eq!(uploaded.file_entry.id, 99);
    }

    #[test]
    fn test_base_url_normalized() {
        let client = FileJumpClient::new(&RemoteConfig {
            base_url: "https://example.test/api/v1".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "https://example.test/api/v1/");
        assert!(client.name().starts_with("filejump:"));
    }
}
