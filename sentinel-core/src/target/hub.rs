//! Hugging Face hub client over HTTP

use super::{FileSelector, HubClient};
use crate::config::HubConfig;
use crate::error::TargetError;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

/// Model info as returned by `/api/models/{repo}/revision/{revision}`
#[derive(Debug, Deserialize)]
struct ModelInfo {
    sha: Option<String>,
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Hub client using the public REST API
#[derive(Debug, Clone)]
pub struct HfHubClient {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
    max_concurrent_downloads: usize,
}

impl HfHubClient {
    pub fn new(config: &HubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("model-sentinel/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()?;
        let endpoint = Url::parse(&config.endpoint)?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Hub endpoint must be an http(s) URL: {}", config.endpoint);
        }

        Ok(Self {
            client,
            endpoint,
            token: config.token(),
            max_concurrent_downloads: config.max_concurrent_downloads.max(1),
        })
    }

    /// Endpoint with the given path segments appended, each percent-encoded
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn model_info(&self, repo_id: &str, revision: &str) -> Result<ModelInfo, TargetError> {
        let target = format!("{repo_id}@{revision}");
        let url = self.url(
            ["api", "models"]
                .into_iter()
                .chain(repo_id.split('/'))
                .chain(["revision", revision]),
        );
        debug!("Fetching model info: {}", url);

        let response = self.get(url).send().await.map_err(|e| {
            warn!("Hub unreachable for {}: {}", target, e);
            TargetError::NotFound {
                target: target.clone(),
            }
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TargetError::NotFound { target });
            }
            status => {
                return Err(TargetError::Hub {
                    target,
                    reason: format!("HTTP {status}"),
                });
            }
        }

        response.json::<ModelInfo>().await.map_err(|e| TargetError::Hub {
            target,
            reason: e.to_string(),
        })
    }

    async fn download(&self, repo_id: &str, sha: &str, path: String) -> Result<(String, Vec<u8>), TargetError> {
        let url = self.url(
            repo_id
                .split('/')
                .chain(["resolve", sha])
                .chain(path.split('/')),
        );
        let fetch_error = |reason: String| TargetError::Fetch {
            path: path.clone(),
            reason,
        };

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        debug!("Downloaded {} ({} bytes)", path, bytes.len());
        Ok((path, bytes.to_vec()))
    }
}

#[async_trait]
impl HubClient for HfHubClient {
    async fn revision_id(&self, repo_id: &str, revision: &str) -> Result<Fingerprint, TargetError> {
        let info = self.model_info(repo_id, revision).await?;
        info.sha
            .map(Fingerprint::new)
            .ok_or_else(|| TargetError::Hub {
                target: format!("{repo_id}@{revision}"),
                reason: "response carries no revision sha".to_string(),
            })
    }

    async fn list_files(
        &self,
        repo_id: &str,
        revision: &str,
        selector: &FileSelector,
    ) -> Result<Vec<(String, Vec<u8>)>, TargetError> {
        let info = self.model_info(repo_id, revision).await?;
        let paths: Vec<String> = info
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|path| selector.matches(path))
            .collect();

        futures::stream::iter(paths)
            .map(|path| self.download(repo_id, revision, path))
            .buffered(self.max_concurrent_downloads)
            .try_collect()
            .await
    }
}
