//! Client side of the control protocol

use crate::archive::{self, TAR_CONTENT_TYPE};
use crate::errors::{MockError, Result};
use crate::mock::{Recording, CASE_PARAM, EXAMPLES_ROUTE, EXPECT_ROUTE, RECORDINGS_ROUTE, RELOAD_ROUTE};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Talks to one mock instance over plain HTTP
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    endpoint: Url,
}

impl ControlClient {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(http: Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, route: &str) -> Result<Url> {
        self.endpoint
            .join(route)
            .map_err(|e| MockError::Control(format!("Invalid control URL {}{}: {}", self.endpoint, route, e)))
    }

    /// POST a tar archive to the upload route
    pub async fn upload_examples(&self, archive: Vec<u8>) -> Result<()> {
        let size = archive.len();
        let response = self
            .http
            .post(self.url(EXAMPLES_ROUTE)?)
            .header(CONTENT_TYPE, TAR_CONTENT_TYPE)
            .body(archive)
            .send()
            .await?;
        require_success(EXAMPLES_ROUTE, response).await?;
        debug!(endpoint = %self.endpoint, bytes = size, "Uploaded examples");
        Ok(())
    }

    /// Archive `dir` and upload it
    pub async fn upload_dir(&self, dir: &Path) -> Result<()> {
        let dir: PathBuf = dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archive::pack_dir(&dir))
            .await
            .map_err(|e| MockError::Archive(format!("Archive task failed: {}", e)))??;
        self.upload_examples(archive).await
    }

    pub async fn expect(&self, case: &str) -> Result<()> {
        let response = self
            .http
            .get(self.url(EXPECT_ROUTE)?)
            .query(&[(CASE_PARAM, case)])
            .send()
            .await?;
        require_success(EXPECT_ROUTE, response).await?;
        Ok(())
    }

    pub async fn recordings(&self, case: &str) -> Result<Recording> {
        let response = self
            .http
            .get(self.url(RECORDINGS_ROUTE)?)
            .query(&[(CASE_PARAM, case)])
            .send()
            .await?;
        let response = require_success(RECORDINGS_ROUTE, response).await?;
        Ok(response.json().await?)
    }

    /// Ask the instance to re-parse its examples; returns once queued
    pub async fn reload(&self) -> Result<()> {
        let response = self.http.post(self.url(RELOAD_ROUTE)?).send().await?;
        require_success(RELOAD_ROUTE, response).await?;
        Ok(())
    }
}

/// Accept any 2xx; turn everything else into an error carrying the body
async fn require_success(route: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{} returned {}: {}", route, status, body.trim());
    Err(match status {
        StatusCode::NOT_FOUND => MockError::NotFound(message),
        StatusCode::BAD_REQUEST => MockError::InvalidInput(message),
        _ => MockError::Control(message),
    })
}
