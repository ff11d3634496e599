//! Fast glob queries against an indexing service (Watchman).
//!
//! [`GlobService`] is the seam the engine talks to. [`WatchmanClient`] is the
//! production implementation: it runs the `watchman` CLI in JSON mode and
//! feeds it one query per call. Every failure mode, including timeouts, maps to
//! [`GlobServiceError`], which the resolver answers with a filesystem scan.
//!
//! The service seam is synchronous. Each query drives the child process on a
//! current-thread tokio runtime, so a timed-out query kills the child and drops
//! its pipes before returning.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::GlobRequest;
use crate::paths::to_slash;

/// The designated failure type of a glob service.
#[derive(Debug, thiserror::Error)]
pub enum GlobServiceError {
  /// The service answered with an error.
  #[error("{0}")]
  Query(String),

  #[error("query timed out after {0:?}")]
  Timeout(Duration),

  #[error("failed to run watchman: {0}")]
  Io(#[from] io::Error),

  #[error("malformed watchman response: {0}")]
  Decode(#[from] serde_json::Error),
}

/// A glob query rooted at a watched directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobQuery {
  pub watch_root: PathBuf,
  /// Directory the patterns are relative to, relative to `watch_root`.
  pub relative_root: Option<String>,
  pub expression: Value,
}

impl GlobQuery {
  pub fn new(watch_root: &Path, base_dir: &Path, request: &GlobRequest) -> Self {
    let (watch_root, relative_root) = match base_dir.strip_prefix(watch_root) {
      Ok(relative) => {
        let relative = to_slash(relative);
        (watch_root.to_path_buf(), (!relative.is_empty()).then_some(relative))
      }
      Err(_) => (base_dir.to_path_buf(), None),
    };

    GlobQuery {
      watch_root,
      relative_root,
      expression: expression(request),
    }
  }

  /// The full `["query", root, params]` command.
  pub fn command(&self) -> Value {
    let mut params = json!({
      "expression": self.expression,
      "fields": ["name"],
    });
    if let Some(relative_root) = &self.relative_root {
      params["relative_root"] = json!(relative_root);
    }
    json!(["query", self.watch_root, params])
  }
}

fn match_terms(patterns: &[String], include_dotfiles: bool) -> Value {
  let mut terms = vec![json!("anyof")];
  for pattern in patterns {
    if include_dotfiles {
      terms.push(json!(["match", pattern, "wholename", { "includedotfiles": true }]));
    } else {
      terms.push(json!(["match", pattern, "wholename"]));
    }
  }
  Value::Array(terms)
}

fn expression(request: &GlobRequest) -> Value {
  let mut terms = vec![
    json!("allof"),
    json!(["type", "f"]),
    match_terms(&request.includes, request.include_dotfiles),
  ];
  if !request.excludes.is_empty() {
    terms.push(json!(["not", match_terms(&request.excludes, request.include_dotfiles)]));
  }
  Value::Array(terms)
}

/// Successful service response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryResponse {
  #[serde(default)]
  pub files: Vec<String>,
  #[serde(default)]
  pub warning: Option<String>,
}

/// An external service answering glob queries.
pub trait GlobService: Send + Sync {
  fn query(&self, query: &GlobQuery) -> Result<QueryResponse, GlobServiceError>;
}

/// Watchman reply as it comes off the wire.
#[derive(Debug, Deserialize)]
struct RawResponse {
  #[serde(default)]
  files: Vec<String>,
  #[serde(default)]
  warning: Option<String>,
  #[serde(default)]
  error: Option<String>,
}

/// [`GlobService`] backed by the `watchman` command line client.
#[derive(Debug, Clone)]
pub struct WatchmanClient {
  binary: PathBuf,
  timeout: Duration,
}

impl Default for WatchmanClient {
  fn default() -> Self {
    Self::new()
  }
}

impl WatchmanClient {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

  pub fn new() -> Self {
    WatchmanClient {
      binary: PathBuf::from("watchman"),
      timeout: Self::DEFAULT_TIMEOUT,
    }
  }

  pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
    self.binary = binary.into();
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  async fn run(&self, command: &Value) -> Result<Output, GlobServiceError> {
    let mut child = Command::new(&self.binary)
      .args(["-j", "--no-pretty"])
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()?;

    let mut stdin = child
      .stdin
      .take()
      .ok_or_else(|| io::Error::other("watchman stdin unavailable"))?;
    let mut request = serde_json::to_vec(command)?;
    request.push(b'\n');
    stdin.write_all(&request).await?;
    drop(stdin);

    Ok(child.wait_with_output().await?)
  }
}

impl GlobService for WatchmanClient {
  fn query(&self, query: &GlobQuery) -> Result<QueryResponse, GlobServiceError> {
    let command = query.command();
    debug!(binary = %self.binary.display(), query = %command, "querying watchman");

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let output = runtime
      .block_on(async { tokio::time::timeout(self.timeout, self.run(&command)).await })
      .map_err(|_| GlobServiceError::Timeout(self.timeout))??;

    if output.stdout.iter().all(u8::is_ascii_whitespace) {
      return Err(GlobServiceError::Query(format!(
        "watchman exited with {} and no output",
        output.status
      )));
    }

    let raw: RawResponse = serde_json::from_slice(&output.stdout)?;
    if let Some(error) = raw.error {
      return Err(GlobServiceError::Query(error));
    }
    if !output.status.success() {
      return Err(GlobServiceError::Query(format!("watchman exited with {}", output.status)));
    }

    Ok(QueryResponse {
      files: raw.files,
      warning: raw.warning,
    })
  }
}
