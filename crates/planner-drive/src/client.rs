//! Google Drive v3 API client.
//!
//! Only the four calls the task file needs: list, media download, multipart
//! create and media update.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::config::Endpoints;
use crate::credentials::CredentialProvider;
use crate::error::{DriveError, DriveResult};

/// Fields requested for each listed file.
const LIST_FIELDS: &str = "files(id,name,mimeType,shared)";

/// Fields returned by create calls.
const FILE_FIELDS: &str = "id,name,mimeType";

const JSON_MIME: &str = "application/json";

const MULTIPART_BOUNDARY: &str = "koci_planner_upload_boundary";

/// Metadata of a Drive file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileRecord>,
}

/// Parameters of a `files.list` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Exact file name to search for.
    pub name: String,
    pub page_size: u32,
}

impl ListQuery {
    /// Drive search expression for a non-trashed file with this exact name.
    pub fn search_expression(&self) -> String {
        let escaped = self.name.replace('\\', "\\\\").replace('\'', "\\'");
        format!("name = '{}' and trashed = false", escaped)
    }
}

/// The Drive operations used by the locator and sync service.
pub trait DriveApi: Send + Sync {
    /// Lists one page of files matching the query.
    fn list_files<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, DriveResult<Vec<FileRecord>>>;

    /// Downloads a file's content.
    fn get_media<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, DriveResult<Vec<u8>>>;

    /// Creates a JSON file with the given name and content.
    fn create_file<'a>(
        &'a self,
        name: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, DriveResult<FileRecord>>;

    /// Replaces a file's content, keeping its id.
    fn update_file<'a>(&'a self, file_id: &'a str, body: Vec<u8>) -> BoxFuture<'a, DriveResult<()>>;
}

/// HTTP implementation of [`DriveApi`].
#[derive(Debug)]
pub struct DriveClient {
    http_client: reqwest::Client,
    endpoints: Endpoints,
    credentials: Arc<CredentialProvider>,
}

impl DriveClient {
    pub fn new(
        endpoints: Endpoints,
        credentials: Arc<CredentialProvider>,
        timeout: Duration,
    ) -> DriveResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriveError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoints,
            credentials,
        })
    }

    /// Sends the request and maps non-success statuses to errors.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> DriveResult<reqwest::Response> {
        let token = self.credentials.bearer_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DriveError::from_transport(&format!("{} failed", what), e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%status, what, "drive request failed");
        Err(match status {
            reqwest::StatusCode::UNAUTHORIZED => {
                DriveError::authentication("access token expired or invalid")
            }
            reqwest::StatusCode::FORBIDDEN => {
                DriveError::authorization(format!("access denied: {}", body))
            }
            reqwest::StatusCode::NOT_FOUND => DriveError::not_found(format!("{}: file not found", what)),
            _ => DriveError::server(format!("API error ({}): {}", status, body)),
        })
    }

    async fn read_body(response: reqwest::Response) -> DriveResult<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| DriveError::from_transport("failed to read response", e))
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> DriveResult<T> {
        serde_json::from_slice(body).map_err(|e| {
            DriveError::invalid_response(format!("failed to parse response: {}", e))
        })
    }
}

/// Builds a `multipart/related` body: JSON metadata part, then the media part.
fn multipart_body(name: &str, content: &[u8]) -> DriveResult<Vec<u8>> {
    let metadata = serde_json::json!({ "name": name, "mimeType": JSON_MIME });
    let metadata = serde_json::to_string(&metadata)
        .map_err(|e| DriveError::internal(format!("failed to serialize metadata: {}", e)))?;

    let mut body = Vec::with_capacity(content.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n\
             --{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = MULTIPART_BOUNDARY,
            m = metadata,
            mime = JSON_MIME,
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    Ok(body)
}

impl DriveApi for DriveClient {
    fn list_files<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, DriveResult<Vec<FileRecord>>> {
        Box::pin(async move {
            let url = format!("{}/files", self.endpoints.drive_api);
            let request = self.http_client.get(&url).query(&[
                ("pageSize", query.page_size.to_string()),
                ("fields", LIST_FIELDS.to_string()),
                ("q", query.search_expression()),
                ("includeItemsFromAllDrives", "true".to_string()),
                ("supportsAllDrives", "true".to_string()),
            ]);

            let response = self.execute(request, "list files").await?;
            let list: FileListResponse = Self::parse(&Self::read_body(response).await?)?;
            debug!(count = list.files.len(), name = %query.name, "listed files");
            Ok(list.files)
        })
    }

    fn get_media<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, DriveResult<Vec<u8>>> {
        Box::pin(async move {
            let url = format!(
                "{}/files/{}",
                self.endpoints.drive_api,
                urlencoding::encode(file_id)
            );
            let request = self
                .http_client
                .get(&url)
                .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

            let response = self.execute(request, "download file").await?;
            let body = Self::read_body(response).await?;
            debug!(file_id, bytes = body.len(), "downloaded file");
            Ok(body)
        })
    }

    fn create_file<'a>(
        &'a self,
        name: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, DriveResult<FileRecord>> {
        Box::pin(async move {
            let url = format!("{}/files", self.endpoints.drive_upload);
            let request = self
                .http_client
                .post(&url)
                .query(&[
                    ("uploadType", "multipart"),
                    ("fields", FILE_FIELDS),
                    ("supportsAllDrives", "true"),
                ])
                .header(
                    reqwest::header::CONTENT_TYPE,
                    format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                )
                .body(multipart_body(name, &body)?);

            let response = self.execute(request, "create file").await?;
            let record: FileRecord = Self::parse(&Self::read_body(response).await?)?;
            debug!(file_id = %record.id, name, "created file");
            Ok(record)
        })
    }

    fn update_file<'a>(&'a self, file_id: &'a str, body: Vec<u8>) -> BoxFuture<'a, DriveResult<()>> {
        Box::pin(async move {
            let url = format!(
                "{}/files/{}",
                self.endpoints.drive_upload,
                urlencoding::encode(file_id)
            );
            let request = self
                .http_client
                .patch(&url)
                .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
                .header(reqwest::header::CONTENT_TYPE, JSON_MIME)
                .body(body);

            self.execute(request, "update file").await?;
            debug!(file_id, "updated file");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::FakeExchanger;
    use crate::tokens::TokenInfo;
    use wiremock::matchers::{bearer_token, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> DriveClient {
        let (provider, _rx) = CredentialProvider::new(Arc::new(FakeExchanger::default()));
        provider
            .install(TokenInfo::new("ya29.test", None, Some(3600), "", None))
            .await;
        DriveClient::new(
            Endpoints::local(&server.uri()),
            Arc::new(provider),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn query(name: &str) -> ListQuery {
        ListQuery {
            name: name.to_string(),
            page_size: 10,
        }
    }

    #[test]
    fn search_expression_escapes_quotes() {
        assert_eq!(
            query("koci_planer_todos.json").search_expression(),
            "name = 'koci_planer_todos.json' and trashed = false"
        );
        assert_eq!(
            query("it's").search_expression(),
            r"name = 'it\'s' and trashed = false"
        );
    }

    #[test]
    fn multipart_body_layout() {
        let body = multipart_body("todos.json", b"[]").unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--koci_planner_upload_boundary\r\n"));
        assert!(text.contains(r#"{"mimeType":"application/json","name":"todos.json"}"#));
        assert!(text.contains("\r\n\r\n[]\r\n--koci_planner_upload_boundary--"));
    }

    #[tokio::test]
    async fn list_files_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(bearer_token("ya29.test"))
            .and(query_param("pageSize", "10"))
            .and(query_param("fields", "files(id,name,mimeType,shared)"))
            .and(query_param("includeItemsFromAllDrives", "true"))
            .and(query_param("supportsAllDrives", "true"))
            .and(query_param("q", "name = 'todos.json' and trashed = false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "f1", "name": "todos.json", "mimeType": "application/json", "shared": true}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server).await.list_files(&query("todos.json")).await.unwrap();
        assert_eq!(
            files,
            vec![FileRecord {
                id: "f1".to_string(),
                name: "todos.json".to_string(),
                mime_type: "application/json".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn empty_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let files = client(&server).await.list_files(&query("x")).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn get_media_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let body = client(&server).await.get_media("f1").await.unwrap();
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn create_uses_multipart_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(header(
                "content-type",
                "multipart/related; boundary=koci_planner_upload_boundary",
            ))
            .and(body_string_contains(r#""name":"todos.json""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "new-id", "name": "todos.json", "mimeType": "application/json"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = client(&server)
            .await
            .create_file("todos.json", b"[]".to_vec())
            .await
            .unwrap();
        assert_eq!(record.id, "new-id");
    }

    #[tokio::test]
    async fn update_uses_media_upload() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/f1"))
            .and(query_param("uploadType", "media"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "f1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .update_file("f1", b"[]".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_codes_map_to_error_codes() {
        use crate::error::DriveErrorCode;

        let server = MockServer::start().await;
        for (id, status) in [("a", 401), ("b", 403), ("c", 404), ("d", 500)] {
            Mock::given(method("GET"))
                .and(path(format!("/drive/v3/files/{}", id)))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let client = client(&server).await;
        let codes: Vec<_> = error_codes(&client, &["a", "b", "c", "d"]).await;
        assert_eq!(
            codes,
            vec![
                DriveErrorCode::AuthenticationFailed,
                DriveErrorCode::AuthorizationFailed,
                DriveErrorCode::NotFound,
                DriveErrorCode::ServerError,
            ]
        );
    }

    async fn error_codes(client: &DriveClient, ids: &[&str]) -> Vec<crate::error::DriveErrorCode> {
        let mut codes = Vec::new();
        for id in ids {
            codes.push(client.get_media(id).await.unwrap_err().code());
        }
        codes
    }

    #[tokio::test]
    async fn signed_out_client_fails_before_sending() {
        let server = MockServer::start().await;
        let (provider, _rx) = CredentialProvider::new(Arc::new(FakeExchanger::default()));
        let client = DriveClient::new(
            Endpoints::local(&server.uri()),
            Arc::new(provider),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(client.get_media("f1").await.unwrap_err().is_auth());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
