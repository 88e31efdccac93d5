use crate::constants::{DEFAULT_ENDPOINT, ENDPOINT_ENV};
use crate::conversation::Conversation;
use crate::types::*;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the streaming tutor service
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Logical conversation id; a random one is used when absent
    #[arg(long)]
    pub session_id: Option<String>,
    /// Directory of cached session records (`<session_id>.json`)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Base URL of the REST API serving session records
    #[arg(long)]
    pub session_api: Option<String>,
    /// Start with an automatic kickoff derived from the session record
    #[arg(long, default_value_t = false)]
    pub kickoff: bool,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// `--endpoint`, then `TUTOR_STREAM_URL`, then the local default.
    pub fn resolve_endpoint(&self) -> String {
        let raw = match &self.endpoint {
            Some(e) if !e.trim().is_empty() => e.clone(),
            _ => match std::env::var(ENDPOINT_ENV) {
                Ok(e) if !e.trim().is_empty() => e,
                _ => DEFAULT_ENDPOINT.to_string(),
            },
        };
        raw.trim().trim_end_matches('/').to_string()
    }

    pub fn resolve_session_id(&self) -> SessionId {
        match &self.session_id {
            Some(id) if !id.trim().is_empty() => SessionId::from(id.trim()),
            _ => SessionId::new(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub args: Arc<Args>,
    pub endpoint: String,
    pub session_id: SessionId,
    pub conversation: Arc<Conversation>,
}

impl AppState {
    pub fn from_args(args: Args) -> Result<Self> {
        let client = build_client(Duration::from_secs(args.connect_timeout_secs))?;
        let endpoint = args.resolve_endpoint();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(TutorError::Config(format!(
                "endpoint must be an http(s) URL, got {:?}",
                endpoint
            ))
            .into());
        }
        Ok(Self {
            client,
            endpoint,
            session_id: args.resolve_session_id(),
            args: Arc::new(args),
            conversation: Arc::new(Conversation::new()),
        })
    }
}

/// HTTP client for the stream service.
///
/// Only connecting is bounded; a streaming answer may take as long as it takes.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()?;
    Ok(client)
}
