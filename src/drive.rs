use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::parser::document::Document;
use crate::parser::post::DriveFile;

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DOCS_URL: &str = "https://docs.googleapis.com/v1/documents";
const DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, createdTime, modifiedTime, version)";
const PAGE_SIZE: &str = "1000";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// Remote side of the sync: where documents and their versions come from.
pub trait DocumentStore: Send + Sync + 'static {
    fn get_document(&self, id: &str) -> impl Future<Output = Result<Document>> + Send;
    fn get_file_version(&self, id: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Where image bytes come from.
pub trait FileSource: Send + Sync {
    fn download_file(&self, id: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Thin client over the Drive and Docs REST APIs, authenticated with a
/// bearer access token.
pub struct DriveClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct VersionOnly {
    version: Option<String>,
}

impl DriveClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            token: token.to_string(),
        })
    }

    /// All non-trashed documents directly inside `folder_id`, following
    /// pagination until the listing is exhausted.
    pub async fn list_doc_files(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let q = list_query(folder_id);
        let q = q.as_str();

        let files = collect_pages(|page_token| async move {
            let mut query = vec![
                ("q", q),
                ("pageSize", PAGE_SIZE),
                ("fields", LIST_FIELDS),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
                ("corpora", "allDrives"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            self.get(DRIVE_FILES_URL, &query)
                .await?
                .json::<FileList>()
                .await
                .context("Failed to decode file listing")
        })
        .await?;

        info!("Found {} documents in folder {}", files.len(), folder_id);
        Ok(files)
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await
                .with_context(|| format!("Request to {url} failed"))?;

            let status = response.status();
            let Some(backoff) = retry_delay(status, attempt) else {
                return response
                    .error_for_status()
                    .with_context(|| format!("Request to {url} was rejected"));
            };

            warn!(
                "{} from {} (attempt {}/{}), backing off {:.1}s",
                status,
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

impl DocumentStore for DriveClient {
    async fn get_document(&self, id: &str) -> Result<Document> {
        let url = format!("{DOCS_URL}/{id}");
        self.get(&url, &[])
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to decode document {id}"))
    }

    async fn get_file_version(&self, id: &str) -> Result<Option<String>> {
        let url = format!("{DRIVE_FILES_URL}/{id}");
        let body: VersionOnly = self
            .get(&url, &[("fields", "version"), ("supportsAllDrives", "true")])
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to decode version of {id}"))?;
        Ok(body.version)
    }
}

impl FileSource for DriveClient {
    async fn download_file(&self, id: &str) -> Result<Vec<u8>> {
        let url = format!("{DRIVE_FILES_URL}/{id}");
        let bytes = self
            .get(&url, &[("alt", "media"), ("supportsAllDrives", "true")])
            .await?
            .bytes()
            .await
            .with_context(|| format!("Failed to download file {id}"))?;
        Ok(bytes.to_vec())
    }
}

/// Follow `nextPageToken` until the listing is exhausted.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<DriveFile>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<FileList>>,
{
    let mut files = Vec::new();
    let mut page_token = None;
    loop {
        let page = fetch_page(page_token.take()).await?;
        debug!("Listed {} files", page.files.len());
        files.extend(page.files);

        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => return Ok(files),
        }
    }
}

/// Backoff before retrying a response with `status`, or `None` when it
/// should be returned as is (success, client error, or retries used up).
fn retry_delay(status: StatusCode, attempt: u32) -> Option<Duration> {
    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    if !retryable || attempt >= MAX_RETRIES {
        return None;
    }
    Some(Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt)))
}

fn list_query(folder_id: &str) -> String {
    [
        format!("'{}' in parents", folder_id.replace('\'', "\\'")),
        format!("mimeType = '{DOC_MIME_TYPE}'"),
        "trashed = false".to_string(),
    ]
    .join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_query() {
        assert_eq!(
            list_query("abc123"),
            "'abc123' in parents and mimeType = 'application/vnd.google-apps.document' and trashed = false"
        );
        assert!(list_query("it's").starts_with("'it\\'s' in parents"));
    }

    #[test]
    fn retries_rate_limits_and_server_errors_with_backoff() {
        assert_eq!(
            retry_delay(StatusCode::TOO_MANY_REQUESTS, 0),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            retry_delay(StatusCode::SERVICE_UNAVAILABLE, 1),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(
            retry_delay(StatusCode::INTERNAL_SERVER_ERROR, 2),
            Some(Duration::from_millis(8000))
        );
        assert_eq!(retry_delay(StatusCode::BAD_GATEWAY, MAX_RETRIES), None);
    }

    #[test]
    fn does_not_retry_success_or_client_errors() {
        for status in [
            StatusCode::OK,
            StatusCode::NOT_FOUND,
            StatusCode::FORBIDDEN,
            StatusCode::BAD_REQUEST,
        ] {
            assert_eq!(retry_delay(status, 0), None, "{status}");
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> FileList {
        FileList {
            files: ids
                .iter()
                .map(|id| DriveFile {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
            next_page_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn follows_page_tokens_until_exhausted() {
        let mut seen = Vec::new();
        let files = collect_pages(|token| {
            seen.push(token.clone());
            async move {
                Ok::<_, anyhow::Error>(match token.as_deref() {
                    None => page(&["a", "b"], Some("p2")),
                    Some("p2") => page(&[], Some("p3")),
                    Some("p3") => page(&["c"], None),
                    Some(other) => anyhow::bail!("unexpected token {other}"),
                })
            }
        })
        .await
        .unwrap();

        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(seen, vec![None, Some("p2".into()), Some("p3".into())]);
    }

    #[tokio::test]
    async fn page_error_aborts_listing() {
        let result =
            collect_pages(|_| async { Err::<FileList, _>(anyhow::anyhow!("403 Forbidden")) }).await;
        assert!(result.is_err());
    }

    #[test]
    fn decodes_file_listing() {
        let json = r#"{
            "nextPageToken": "tok",
            "files": [{
                "id": "1abc", "name": "Post", "version": "42",
                "createdTime": "2025-01-01T00:00:00.000Z",
                "modifiedTime": "2025-01-02T00:00:00.000Z"
            }]
        }"#;
        let page: FileList = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("tok"));
        assert_eq!(page.files[0].version.as_deref(), Some("42"));
        assert_eq!(
            page.files[0].modified_time.as_deref(),
            Some("2025-01-02T00:00:00.000Z")
        );

        let empty: FileList = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
        assert!(empty.next_page_token.is_none());
    }
}
