/// Event line prefix on the inbound stream
pub const DATA_PREFIX: &str = "data:";

/// Payload that logically terminates a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Path appended to the stream endpoint base URL
pub const CHAT_PATH: &str = "/chat";

/// JSON object fields that may carry fragment text, in priority order
pub const FRAGMENT_FIELDS: &[&str] = &["text", "content", "message"];

/// Stream endpoint used when neither `--endpoint` nor `TUTOR_STREAM_URL` is set
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
pub const ENDPOINT_ENV: &str = "TUTOR_STREAM_URL";

/// Kickoff prompt when a session record carries no usable content
pub const DEFAULT_PROBLEM_PROMPT: &str =
    "Let's work through this problem together. What are we trying to find?";

/// Chars of a payload shown in trace logs
pub const LOG_PREVIEW_CHARS: usize = 80;

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "tutorstream=info";
