//! ScreenSteps v2 REST client. Calls are strictly sequential: every
//! successful call is followed by a fixed pause, and 429 responses are
//! retried after the server's `retry_in` hint.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::blocks::{ContentBlock, ImageSink};
use crate::config::ApiSettings;
use crate::error::ApiError;

const DEFAULT_IMAGE_WIDTH: u32 = 800;
const DEFAULT_IMAGE_HEIGHT: u32 = 600;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: String,
    pub user: String,
    pub token: String,
}

pub struct ScreenStepsClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
    min_call_interval: Duration,
    default_retry: Duration,
    max_rate_limit_retries: Option<u32>,
}

/// Chapter entry sent inline with manual creation.
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatedManual {
    pub id: u64,
    /// Chapters created inline, in request order.
    #[serde(default)]
    pub chapters: Vec<IdOnly>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub id: u64,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct ManualEnvelope {
    manual: CreatedManual,
}

#[derive(Deserialize)]
struct ChapterEnvelope {
    chapter: IdOnly,
}

#[derive(Deserialize)]
struct ArticleEnvelope {
    article: IdOnly,
}

#[derive(Debug, Deserialize)]
pub struct IdOnly {
    pub id: u64,
}

#[derive(Deserialize)]
struct SitesEnvelope {
    #[serde(default)]
    sites: Vec<IdOnly>,
}

#[derive(Deserialize)]
struct FileEnvelope {
    file: FileInfo,
}

#[derive(Deserialize)]
struct FileInfo {
    id: u64,
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct RetryHint {
    retry_in: Option<f64>,
}

impl ScreenStepsClient {
    pub fn new(settings: &ApiSettings, creds: &Credentials) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: settings.base_url_for(&creds.account),
            user: creds.user.clone(),
            token: creds.token.clone(),
            min_call_interval: settings.min_call_interval(),
            default_retry: Duration::from_secs(settings.default_retry_secs),
            max_rate_limit_retries: settings.max_rate_limit_retries,
        })
    }

    /// Ids of all sites visible to these credentials.
    pub async fn list_sites(&self) -> Result<Vec<u64>, ApiError> {
        let endpoint = "sites";
        let body = self
            .execute(endpoint, || self.request(Method::GET, endpoint))
            .await?;
        let sites: SitesEnvelope = decode(endpoint, &body)?;
        Ok(sites.sites.into_iter().map(|s| s.id).collect())
    }

    pub async fn create_manual(
        &self,
        site_id: &str,
        title: &str,
        chapters: &[NewChapter],
        published: bool,
    ) -> Result<CreatedManual, ApiError> {
        let endpoint = format!("sites/{site_id}/manuals");
        let chapters: Vec<Value> = chapters
            .iter()
            .map(|c| json!({ "position": c.position, "title": c.title, "published": true }))
            .collect();
        let payload = json!({
            "manual": { "title": title, "published": published, "chapters": chapters }
        });
        let body = self.post_json(&endpoint, &payload).await?;
        let created: ManualEnvelope = decode(&endpoint, &body)?;
        Ok(created.manual)
    }

    pub async fn create_chapter(
        &self,
        site_id: &str,
        manual_id: u64,
        title: &str,
        position: i64,
    ) -> Result<u64, ApiError> {
        let endpoint = format!("sites/{site_id}/chapters");
        let payload = json!({
            "chapter": { "position": position, "title": title, "published": true, "manual_id": manual_id }
        });
        let body = self.post_json(&endpoint, &payload).await?;
        let created: ChapterEnvelope = decode(&endpoint, &body)?;
        Ok(created.chapter.id)
    }

    pub async fn create_article(
        &self,
        site_id: &str,
        chapter_id: u64,
        title: &str,
        position: usize,
    ) -> Result<u64, ApiError> {
        let endpoint = format!("sites/{site_id}/articles");
        let payload = json!({
            "article": { "position": position, "title": title, "published": true, "chapter_id": chapter_id }
        });
        let body = self.post_json(&endpoint, &payload).await?;
        let created: ArticleEnvelope = decode(&endpoint, &body)?;
        Ok(created.article.id)
    }

    /// Multipart upload of one image file as an `ImageAsset`.
    pub async fn upload_image(&self, site_id: &str, path: &Path) -> Result<UploadedImage, ApiError> {
        let endpoint = format!("sites/{site_id}/files");
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let body = self
            .execute(&endpoint, || {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                let form = Form::new().text("type", "ImageAsset").part("file", part);
                self.request(Method::POST, &endpoint).multipart(form)
            })
            .await?;
        let file: FileEnvelope = decode(&endpoint, &body)?;
        Ok(UploadedImage {
            id: file.file.id,
            url: file.file.url.unwrap_or_default(),
            width: file.file.width.unwrap_or(DEFAULT_IMAGE_WIDTH),
            height: file.file.height.unwrap_or(DEFAULT_IMAGE_HEIGHT),
        })
    }

    pub async fn update_article_contents(
        &self,
        site_id: &str,
        article_id: u64,
        title: &str,
        blocks: &[ContentBlock],
        publish: bool,
    ) -> Result<(), ApiError> {
        let endpoint = format!("sites/{site_id}/articles/{article_id}/contents");
        let payload = json!({
            "article": { "title": title, "content_blocks": blocks, "publish": publish }
        });
        self.post_json(&endpoint, &payload).await?;
        Ok(())
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, endpoint))
            .basic_auth(&self.user, Some(&self.token))
    }

    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<String, ApiError> {
        self.execute(endpoint, || self.request(Method::POST, endpoint).json(payload))
            .await
    }

    /// Send until the API gives a non-429 answer. `build` is called once
    /// per attempt since multipart bodies cannot be replayed.
    async fn execute<F>(&self, endpoint: &str, build: F) -> Result<String, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let response = build().send().await.map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
            let status = response.status();
            let body = response.text().await.map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

            if status.is_success() {
                debug!("{endpoint}: {status}");
                tokio::time::sleep(self.min_call_interval).await;
                return Ok(body);
            }

            if status != StatusCode::TOO_MANY_REQUESTS {
                return Err(ApiError::Status {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }

            if self.max_rate_limit_retries.is_some_and(|max| attempts > max) {
                return Err(ApiError::RateLimited {
                    endpoint: endpoint.to_string(),
                    attempts,
                });
            }
            let wait = retry_after(&body).unwrap_or(self.default_retry) + self.min_call_interval;
            warn!(
                "{endpoint}: rate limited (attempt {attempts}), retrying in {:.1}s",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// `retry_in` seconds from a 429 body, if present.
fn retry_after(body: &str) -> Option<Duration> {
    let hint: RetryHint = serde_json::from_str(body).ok()?;
    hint.retry_in
        .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Uploads images into one site.
pub struct SiteImages<'a> {
    pub client: &'a ScreenStepsClient,
    pub site_id: &'a str,
}

impl ImageSink for SiteImages<'_> {
    async fn upload_image(&mut self, path: &Path) -> Result<UploadedImage, ApiError> {
        self.client.upload_image(self.site_id, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use httpmock::prelude::*;

    fn client(server: &MockServer, retries: Option<u32>) -> ScreenStepsClient {
        let mut settings = Settings::defaults().unwrap().api;
        settings.base_url = server.base_url();
        settings.min_call_interval_ms = 0;
        settings.default_retry_secs = 0;
        settings.max_rate_limit_retries = retries;
        let creds = Credentials {
            account: "acme".into(),
            user: "u".into(),
            token: "t".into(),
        };
        ScreenStepsClient::new(&settings, &creds).unwrap()
    }

    #[tokio::test]
    async fn create_manual_sends_inline_chapters() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sites/9/manuals")
                    .header("authorization", "Basic dTp0")
                    .json_body(json!({
                        "manual": {
                            "title": "Lab",
                            "published": false,
                            "chapters": [
                                { "position": 1, "title": "One", "published": true },
                                { "position": 2, "title": "Two", "published": true }
                            ]
                        }
                    }));
                then.status(201).json_body(json!({
                    "manual": {
                        "id": 55,
                        "title": "Lab",
                        "chapters": [ { "id": 501, "title": "One", "position": 1 } ]
                    }
                }));
            })
            .await;

        let chapters = vec![
            NewChapter { title: "One".into(), position: 1 },
            NewChapter { title: "Two".into(), position: 2 },
        ];
        let created = client(&server, None)
            .create_manual("9", "Lab", &chapters, false)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(created.id, 55);
        assert_eq!(created.chapters.len(), 1);
        assert_eq!(created.chapters[0].id, 501);
    }

    #[tokio::test]
    async fn create_article_and_chapter_return_ids() {
        let server = MockServer::start_async().await;
        let article = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sites/9/articles")
                    .json_body_partial(r#"{"article": {"chapter_id": 501, "position": 3}}"#);
                then.status(201).json_body(json!({ "article": { "id": 42 } }));
            })
            .await;
        let chapter = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sites/9/chapters")
                    .json_body_partial(r#"{"chapter": {"manual_id": 55, "title": "Extra"}}"#);
                then.status(200).json_body(json!({ "chapter": { "id": 777 } }));
            })
            .await;

        let c = client(&server, None);
        assert_eq!(c.create_article("9", 501, "Art", 3).await.unwrap(), 42);
        assert_eq!(c.create_chapter("9", 55, "Extra", 4).await.unwrap(), 777);
        article.assert_async().await;
        chapter.assert_async().await;
    }

    #[tokio::test]
    async fn upload_image_defaults_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sites/9/files")
                    .body_contains("ImageAsset")
                    .body_contains("shot.png");
                then.status(201)
                    .json_body(json!({ "file": { "id": 9001, "url": "https://cdn/x.png" } }));
            })
            .await;

        let image = client(&server, None).upload_image("9", &path).await.unwrap();
        mock.assert_async().await;
        assert_eq!(
            image,
            UploadedImage {
                id: 9001,
                url: "https://cdn/x.png".into(),
                width: 800,
                height: 600,
            }
        );
    }

    #[tokio::test]
    async fn missing_image_file_is_an_image_error() {
        let server = MockServer::start_async().await;
        let err = client(&server, None)
            .upload_image("9", Path::new("no/such.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Image { .. }));
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/sites/9/articles/42/contents");
                then.status(422).body("bad blocks");
            })
            .await;

        let err = client(&server, None)
            .update_article_contents("9", 42, "T", &[], true)
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, body, .. } => {
                assert_eq!(status, 422);
                assert_eq!(body, "bad blocks");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_is_retried_until_cap() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/sites");
                then.status(429).json_body(json!({ "error": "slow down", "retry_in": 0 }));
            })
            .await;

        let err = client(&server, Some(2)).list_sites().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { attempts: 3, .. }));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn rate_limited_call_succeeds_after_retry() {
        let server = MockServer::start_async().await;
        let mut limited = server
            .mock_async(|when, then| {
                when.method(GET).path("/sites");
                then.status(429).json_body(json!({ "error": "slow down", "retry_in": 0.5 }));
            })
            .await;

        let c = client(&server, None);
        let call = tokio::spawn(async move { c.list_sites().await });

        while limited.hits_async().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        limited.delete_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET).path("/sites");
                then.status(200).json_body(json!({ "sites": [ { "id": 9 } ] }));
            })
            .await;

        assert_eq!(call.await.unwrap().unwrap(), vec![9]);
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn list_sites_returns_ids() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sites");
                then.status(200)
                    .json_body(json!({ "sites": [ { "id": 9, "title": "Docs" }, { "id": 12 } ] }));
            })
            .await;
        assert_eq!(client(&server, None).list_sites().await.unwrap(), vec![9, 12]);
    }

    #[test]
    fn retry_hint_parsing() {
        assert_eq!(retry_after(r#"{"retry_in": 7}"#), Some(Duration::from_secs(7)));
        assert_eq!(retry_after(r#"{"retry_in": 0}"#), Some(Duration::ZERO));
        assert_eq!(retry_after(r#"{"error": "x"}"#), None);
        assert_eq!(retry_after("not json"), None);
        assert_eq!(retry_after(r#"{"retry_in": 1e30}"#), None);
        assert_eq!(retry_after(r#"{"retry_in": -3}"#), Some(Duration::ZERO));
    }
}
