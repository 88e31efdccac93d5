//! Derives the kickoff problem statement from a captured session record.

use crate::constants::DEFAULT_PROBLEM_PROMPT;
use crate::types::{Result, SessionId, TutorError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Formula {
        latex: String,
    },
    Text {
        content: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    /// Document-level text used when no block is usable.
    #[serde(default, alias = "problem", alias = "fallback")]
    pub document_text: Option<String>,
}

/// Picks the problem statement: first formula, first text block, the
/// document text, then the default prompt. Blank candidates are skipped.
pub fn problem_statement(record: &SessionRecord) -> String {
    let first_formula = record.blocks.iter().find_map(|b| match b {
        ContentBlock::Formula { latex } if !latex.trim().is_empty() => Some(latex.trim()),
        _ => None,
    });
    let first_text = || {
        record.blocks.iter().find_map(|b| match b {
            ContentBlock::Text { content } if !content.trim().is_empty() => Some(content.trim()),
            _ => None,
        })
    };
    let document = || {
        record
            .document_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    };

    first_formula
        .or_else(first_text)
        .or_else(document)
        .unwrap_or(DEFAULT_PROBLEM_PROMPT)
        .to_string()
}

/// Somewhere a session record can be loaded from.
pub trait SessionSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the source has no record for this session.
    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<Option<SessionRecord>>>;
}

/// Session records cached as `<dir>/<session_id>.json`.
pub struct LocalCacheSource {
    dir: PathBuf,
}

impl LocalCacheSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", session_id.0))
    }
}

impl SessionSource for LocalCacheSource {
    fn name(&self) -> &'static str {
        "local-cache"
    }

    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
        self.read_record(session_id).boxed()
    }
}

impl LocalCacheSource {
    async fn read_record(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        let path = self.path_for(session_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str::<SessionRecord>(&raw)?;
        Ok(Some(record))
    }
}

/// Session records served at `GET <base>/sessions/<session_id>`.
pub struct RestSessionSource {
    client: reqwest::Client,
    base_url: String,
}

impl RestSessionSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

impl SessionSource for RestSessionSource {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
        self.fetch_record(session_id).boxed()
    }
}

impl RestSessionSource {
    async fn fetch_record(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        let url = format!("{}/sessions/{}", self.base_url, session_id.0);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TutorError::Upstream(status, body).into());
        }
        let record = response.json::<SessionRecord>().await?;
        Ok(Some(record))
    }
}

/// Ordered list of record sources consulted by the kickoff flow.
#[derive(Default)]
pub struct SessionBootstrap {
    sources: Vec<Box<dyn SessionSource>>,
}

impl SessionBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl SessionSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Loads the first available record and derives its problem statement.
    ///
    /// A failing source is logged and skipped; only when no source yields a
    /// record does this return a `Bootstrap` error.
    pub async fn problem_statement(&self, session_id: &SessionId) -> Result<String> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.load(session_id).await {
                Ok(Some(record)) => {
                    tracing::info!(
                        "[📚] Loaded session {} from {}",
                        session_id.short(),
                        source.name()
                    );
                    return Ok(problem_statement(&record));
                }
                Ok(None) => {
                    tracing::debug!("[📚] {} has no record for {}", source.name(), session_id.short());
                }
                Err(e) => {
                    tracing::warn!("[📚] {} failed for {}: {}", source.name(), session_id.short(), e.inner);
                    failures.push(format!("{}: {}", source.name(), e.inner));
                }
            }
        }

        let detail = if failures.is_empty() {
            format!("no session record found for {}", session_id)
        } else {
            failures.join("; ")
        };
        Err(TutorError::Bootstrap(detail).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> SessionRecord {
        serde_json::from_value(json).unwrap_or_default()
    }

    #[test]
    fn formula_wins_over_text() {
        let r = record(serde_json::json!({
            "blocks": [
                {"type": "text", "content": "Solve for x."},
                {"type": "formula", "latex": "2x + 3 = 7"},
            ],
            "document_text": "Worksheet 3",
        }));
        assert_eq!(problem_statement(&r), "2x + 3 = 7");
    }

    #[test]
    fn text_then_document_then_default() {
        let r = record(serde_json::json!({
            "blocks": [{"type": "image", "url": "x.png"}, {"type": "text", "content": "Find the area."}],
        }));
        assert_eq!(problem_statement(&r), "Find the area.");

        let r = record(serde_json::json!({
            "blocks": [{"type": "formula", "latex": "  "}],
            "problem": "Worksheet 3",
        }));
        assert_eq!(problem_statement(&r), "Worksheet 3");

        assert_eq!(problem_statement(&SessionRecord::default()), DEFAULT_PROBLEM_PROMPT);
    }

    #[tokio::test]
    async fn local_cache_reads_records_and_misses_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let id = SessionId::from("s1");
        std::fs::write(
            dir.path().join("s1.json"),
            r#"{"blocks":[{"type":"formula","latex":"\\frac{1}{2}"}]}"#,
        )
        .unwrap();

        let source = LocalCacheSource::new(dir.path());
        let loaded = source.load(&id).await.unwrap();
        assert_eq!(loaded.map(|r| problem_statement(&r)).as_deref(), Some("\\frac{1}{2}"));

        let missing = source.load(&SessionId::from("nope")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn bootstrap_errors_when_nothing_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let bootstrap = SessionBootstrap::new().with_source(LocalCacheSource::new(dir.path()));
        let err = bootstrap.problem_statement(&SessionId::from("missing")).await;
        assert!(matches!(err, Err(e) if matches!(e.inner, TutorError::Bootstrap(_))));
    }

    #[tokio::test]
    async fn corrupt_cache_entry_falls_through_to_next_source() {
        let broken = tempfile::tempdir().unwrap();
        let good = tempfile::tempdir().unwrap();
        std::fs::write(broken.path().join("s2.json"), "{not json").unwrap();
        std::fs::write(
            good.path().join("s2.json"),
            r#"{"blocks":[{"type":"text","content":"Factor x^2 - 1"}]}"#,
        )
        .unwrap();

        let bootstrap = SessionBootstrap::new()
            .with_source(LocalCacheSource::new(broken.path()))
            .with_source(LocalCacheSource::new(good.path()));
        let statement = bootstrap.problem_statement(&SessionId::from("s2")).await.unwrap();
        assert_eq!(statement, "Factor x^2 - 1");
    }
}
