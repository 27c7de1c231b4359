//! Commit lookup for released versions on the remote repository API.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{BaseProgram, BuilderConfig};

const USER_AGENT: &str = concat!("gaia/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";

/// Errors that can occur while resolving a tag.
#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("request to '{url}' failed: {message}")]
  Request { url: String, message: String },

  #[error("request to '{url}' returned HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("unexpected response from '{url}': {message}")]
  Decode { url: String, message: String },
}

/// Resolves a version tag of the base program to the commit it points at.
pub trait TagLookup {
  fn tag_commit(&self, tag: &str) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

#[derive(Debug, Deserialize)]
struct GitRef {
  object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitTag {
  object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
  sha: String,
  #[serde(rename = "type")]
  kind: String,
}

/// Tag lookup against the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubTags {
  client: reqwest::Client,
  api_url: String,
  owner: String,
  repo: String,
}

impl GithubTags {
  pub fn new(api_url: impl Into<String>, base: &BaseProgram) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.into().trim_end_matches('/').to_string(),
      owner: base.owner.clone(),
      repo: base.repo.clone(),
    }
  }

  pub fn from_config(config: &BuilderConfig) -> Self {
    Self::new(&config.api_url, &config.base)
  }

  async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, RemoteError> {
    debug!(url = %url, "querying remote repository");
    let response = self
      .client
      .get(url)
      .header(reqwest::header::USER_AGENT, USER_AGENT)
      .header(reqwest::header::ACCEPT, ACCEPT)
      .send()
      .await
      .map_err(|e| RemoteError::Request {
        url: url.to_string(),
        message: e.to_string(),
      })?;

    if !response.status().is_success() {
      return Err(RemoteError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }

    response.json::<T>().await.map_err(|e| RemoteError::Decode {
      url: url.to_string(),
      message: e.to_string(),
    })
  }
}

impl TagLookup for GithubTags {
  /// The commit a tag points at.
  ///
  /// Annotated tags are peeled to the commit they annotate.
  async fn tag_commit(&self, tag: &str) -> Result<String, RemoteError> {
    let url = format!(
      "{}/repos/{}/{}/git/refs/tags/{}",
      self.api_url, self.owner, self.repo, tag
    );
    let git_ref: GitRef = self.get_json(&url).await?;
    if git_ref.object.kind != "tag" {
      return Ok(git_ref.object.sha);
    }

    let url = format!(
      "{}/repos/{}/{}/git/tags/{}",
      self.api_url, self.owner, self.repo, git_ref.object.sha
    );
    let annotated: GitTag = self.get_json(&url).await?;
    Ok(annotated.object.sha)
  }
}
