//! GitHub releases API client.

use super::error::PublishError;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

/// Page size for release listings (GitHub's maximum).
const PER_PAGE: usize = 100;

/// Listing pages read before giving up on finding a tag.
const MAX_PAGES: usize = 10;

const API_VERSION: &str = "2022-11-28";

/// An asset already attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAsset {
    pub id: u64,
    pub name: String,
    /// Bytes
    #[serde(default)]
    pub size: u64,
}

/// A release as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub draft: bool,
    pub html_url: String,
    /// RFC 6570 template, e.g. `https://uploads.github.com/.../assets{?name,label}`
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
}

/// Payload for creating a release.
#[derive(Debug, Clone, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

/// Release host operations used by the publisher.
pub trait ReleaseHost: Send + Sync {
    /// Every release (drafts included) bound to `tag`.
    fn releases_for_tag(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<RemoteRelease>, PublishError>> + Send;

    fn create_release(
        &self,
        release: &NewRelease,
    ) -> impl Future<Output = Result<RemoteRelease, PublishError>> + Send;

    fn upload_asset(
        &self,
        release: &RemoteRelease,
        name: &str,
        data: Bytes,
    ) -> impl Future<Output = Result<RemoteAsset, PublishError>> + Send;

    /// Flips a draft to published.
    fn publish_draft(
        &self,
        release: &RemoteRelease,
    ) -> impl Future<Output = Result<RemoteRelease, PublishError>> + Send;

    fn delete_release(
        &self,
        release: &RemoteRelease,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Raw contents of an attached asset.
    fn download_asset(
        &self,
        asset: &RemoteAsset,
    ) -> impl Future<Output = Result<Bytes, PublishError>> + Send;
}

/// [`ReleaseHost`] over the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    /// `{api}/repos/{owner}/{repo}/`
    repo_url: Url,
}

impl GitHubClient {
    /// # Arguments
    ///
    /// * `api_url` - API root, normally `https://api.github.com`
    /// * `repository` - `owner/repo`
    /// * `token` - Token with `contents: write` on the repository
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self, PublishError> {
        let mut base = api_url.trim_end_matches('/').to_string();
        base.push_str(&format!("/repos/{}/", repository.trim_matches('/')));
        let repo_url = Url::parse(&base)
            .map_err(|e| PublishError::Config(format!("invalid API URL '{api_url}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| PublishError::Config("GITHUB_TOKEN contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("release_pipeline/", env!("CARGO_PKG_VERSION"))),
        );

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { http, repo_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PublishError> {
        self.repo_url
            .join(path)
            .map_err(|e| PublishError::Config(format!("invalid endpoint '{path}': {e}")))
    }

    async fn send(&self, method: Method, url: Url, request: RequestBuilder) -> Result<Response, PublishError> {
        log::debug!("{method} {url}");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PublishError::Http {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn release_page(&self, page: usize) -> Result<Vec<RemoteRelease>, PublishError> {
        let mut url = self.endpoint("releases")?;
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("page", &page.to_string());
        let request = self.http.get(url.clone());
        Ok(self.send(Method::GET, url, request).await?.json().await?)
    }
}

/// Concrete upload URL for `name` from a release's `upload_url` template.
pub fn upload_url(template: &str, name: &str) -> Result<Url, PublishError> {
    let base = template.split('{').next().unwrap_or(template);
    let mut url = Url::parse(base)
        .map_err(|e| PublishError::Config(format!("invalid upload URL '{template}': {e}")))?;
    url.query_pairs_mut().append_pair("name", name);
    Ok(url)
}

/// MIME type for an asset, from its file name.
pub fn content_type(name: &str) -> &'static str {
    if name.ends_with(".zip") {
        "application/zip"
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        "application/gzip"
    } else if name.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

impl ReleaseHost for GitHubClient {
    async fn releases_for_tag(&self, tag: &str) -> Result<Vec<RemoteRelease>, PublishError> {
        // The by-tag endpoint hides drafts, so scan the listing instead.
        let mut matching = Vec::new();
        for page in 1..=MAX_PAGES {
            let releases = self.release_page(page).await?;
            let last_page = releases.len() < PER_PAGE;
            matching.extend(releases.into_iter().filter(|r| r.tag_name == tag));
            if last_page {
                break;
            }
        }
        Ok(matching)
    }

    async fn create_release(&self, release: &NewRelease) -> Result<RemoteRelease, PublishError> {
        let url = self.endpoint("releases")?;
        let request = self.http.post(url.clone()).json(release);
        Ok(self.send(Method::POST, url, request).await?.json().await?)
    }

    async fn upload_asset(
        &self,
        release: &RemoteRelease,
        name: &str,
        data: Bytes,
    ) -> Result<RemoteAsset, PublishError> {
        let url = upload_url(&release.upload_url, name)?;
        let size = data.len();
        let request = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, content_type(name))
            .body(data);
        let asset: RemoteAsset = self.send(Method::POST, url, request).await?.json().await?;
        log::info!("Uploaded {name} ({size} bytes)");
        Ok(asset)
    }

    async fn publish_draft(&self, release: &RemoteRelease) -> Result<RemoteRelease, PublishError> {
        let url = self.endpoint(&format!("releases/{}", release.id))?;
        let request = self
            .http
            .patch(url.clone())
            .json(&serde_json::json!({ "draft": false }));
        Ok(self.send(Method::PATCH, url, request).await?.json().await?)
    }

    async fn delete_release(&self, release: &RemoteRelease) -> Result<(), PublishError> {
        let url = self.endpoint(&format!("releases/{}", release.id))?;
        let request = self.http.delete(url.clone());
        match self.send(Method::DELETE, url, request).await {
            Ok(_) => Ok(()),
            Err(PublishError::Http { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn download_asset(&self, asset: &RemoteAsset) -> Result<Bytes, PublishError> {
        let url = self.endpoint(&format!("releases/assets/{}", asset.id))?;
        let request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/octet-stream");
        Ok(self.send(Method::GET, url, request).await?.bytes().await?)
    }
}
