//! HTTP listing client for the Drive v3 `files.list` endpoint.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;
use treesync_core::{EntryId, EntryKind, ListPage, RemoteEntry, RemoteListing};

use crate::error::{RemoteError, RemoteResult};
use crate::query::DriveQuery;

/// Default `files.list` endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

/// Entries requested per page.
pub const PAGE_SIZE: u32 = 1000;

const ORDER_BY: &str = "folder,name";
const FIELDS: &str = "nextPageToken,files(id,name,size,mimeType,modifiedTime)";

/// Remote listing backed by the Drive v3 REST API.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    /// Build a client for `endpoint` that authenticates with the bearer `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] when the HTTP client cannot be created.
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| RemoteError::ClientBuild { source })?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_page(
        &self,
        parent_id: &EntryId,
        folders_only: bool,
        page_token: Option<&str>,
    ) -> RemoteResult<ListPage> {
        let params = query_params(parent_id, folders_only, page_token);
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await
            .map_err(|source| RemoteError::Http {
                operation: "files.list",
                parent_id: parent_id.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::HttpStatus {
                operation: "files.list",
                parent_id: parent_id.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| RemoteError::Http {
            operation: "files.list.body",
            parent_id: parent_id.clone(),
            source,
        })?;
        let page = decode_page(&body)?;
        debug!(
            parent_id = %parent_id,
            entries = page.entries.len(),
            has_more = page.continuation().is_some(),
            "listing page fetched"
        );
        Ok(page)
    }
}

#[async_trait]
impl RemoteListing for DriveClient {
    async fn list_page(
        &self,
        parent_id: &EntryId,
        folders_only: bool,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        Ok(self.fetch_page(parent_id, folders_only, page_token).await?)
    }
}

fn query_params(
    parent_id: &EntryId,
    folders_only: bool,
    page_token: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", DriveQuery::children_of(parent_id, folders_only).build()),
        ("pageSize", PAGE_SIZE.to_string()),
        ("orderBy", ORDER_BY.to_string()),
        ("fields", FIELDS.to_string()),
    ];
    if let Some(token) = page_token.filter(|token| !token.is_empty()) {
        params.push(("pageToken", token.to_string()));
    }
    params
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    size: Option<String>,
    modified_time: Option<String>,
}

fn decode_page(body: &str) -> RemoteResult<ListPage> {
    let response: FileListResponse =
        serde_json::from_str(body).map_err(|source| RemoteError::Decode { source })?;
    let entries = response
        .files
        .into_iter()
        .map(into_entry)
        .collect::<RemoteResult<Vec<_>>>()?;
    Ok(ListPage {
        entries,
        next_page_token: response.next_page_token,
    })
}

fn into_entry(file: DriveFile) -> RemoteResult<RemoteEntry> {
    let size = file
        .size
        .as_deref()
        .map(|raw| {
            raw.parse::<u64>().map_err(|_| RemoteError::InvalidField {
                id: file.id.clone(),
                field: "size",
                value: raw.to_string(),
            })
        })
        .transpose()?;
    let modified_time = file
        .modified_time
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|parsed| parsed.timestamp_millis())
                .map_err(|_| RemoteError::InvalidField {
                    id: file.id.clone(),
                    field: "modifiedTime",
                    value: raw.to_string(),
                })
        })
        .transpose()?;

    Ok(RemoteEntry {
        kind: EntryKind::from_mime_type(file.mime_type.as_deref()),
        id: EntryId::new(file.id),
        name: file.name,
        size,
        modified_time,
        mime_type: file.mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_folders_and_leaves() -> Result<(), Box<dyn std::error::Error>> {
        let body = r#"{
            "nextPageToken": "next-1",
            "files": [
                {"id": "f1", "name": "Films", "mimeType": "application/vnd.google-apps.folder"},
                {"id": "m1", "name": "movie.mkv", "mimeType": "video/x-matroska",
                 "size": "1048576", "modifiedTime": "2024-03-01T12:00:00.000Z"}
            ]
        }"#;

        let page = decode_page(body)?;
        assert_eq!(page.continuation(), Some("next-1"));
        assert_eq!(page.entries.len(), 2);

        let folder = &page.entries[0];
        assert!(folder.is_folder());
        assert_eq!(folder.size, None);

        let leaf = &page.entries[1];
        assert_eq!(leaf.kind, EntryKind::Leaf);
        assert_eq!(leaf.size, Some(1_048_576));
        assert_eq!(leaf.modified_time, Some(1_709_294_400_000));
        assert_eq!(leaf.mime_type.as_deref(), Some("video/x-matroska"));
        Ok(())
    }

    #[test]
    fn missing_files_array_is_an_empty_page() -> Result<(), Box<dyn std::error::Error>> {
        let page = decode_page("{}")?;
        assert!(page.entries.is_empty());
        assert_eq!(page.continuation(), None);
        Ok(())
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let bad_size = r#"{"files": [{"id": "x", "name": "x", "size": "big"}]}"#;
        assert!(matches!(
            decode_page(bad_size),
            Err(RemoteError::InvalidField { field: "size", .. })
        ));

        let bad_time = r#"{"files": [{"id": "x", "name": "x", "modifiedTime": "yesterday"}]}"#;
        assert!(matches!(
            decode_page(bad_time),
            Err(RemoteError::InvalidField {
                field: "modifiedTime",
                ..
            })
        ));

        assert!(matches!(
            decode_page("not json"),
            Err(RemoteError::Decode { .. })
        ));
    }

    #[test]
    fn query_params_carry_listing_contract() {
        let params = query_params(&EntryId::from("root"), true, Some("tok"));
        let lookup = |key: &str| {
            params
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(
            lookup("q"),
            Some(
                "'root' in parents and trashed = false and mimeType = 'application/vnd.google-apps.folder'"
            )
        );
        assert_eq!(lookup("pageSize"), Some("1000"));
        assert_eq!(lookup("orderBy"), Some("folder,name"));
        assert_eq!(lookup("pageToken"), Some("tok"));

        let first = query_params(&EntryId::from("root"), false, None);
        assert!(first.iter().all(|(name, _)| *name != "pageToken"));
    }

    #[test]
    fn debug_output_redacts_token() -> Result<(), Box<dyn std::error::Error>> {
        let client = DriveClient::new(DEFAULT_ENDPOINT, "secret-token", Duration::from_secs(5))?;
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret-token"));
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
        Ok(())
    }
}
