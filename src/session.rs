use crate::constants::{CHAT_PATH, LOG_PREVIEW_CHARS};
use crate::conversation::Conversation;
use crate::framing::LineCodec;
use crate::logging::StreamMetric;
use crate::materialize::Materializer;
use crate::payload::{extract, LineKind};
use crate::reconstruct::Reconstructor;
use crate::str_utils::preview;
use crate::types::*;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use std::sync::{Arc, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }
}

/// What a finished session left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub request_id: RequestId,
    pub state: SessionState,
    /// Message owned by the session: the answer, or the error that replaced it.
    pub message_id: Option<MessageId>,
    pub content: String,
}

/// Owned state of one outbound request.
///
/// Never resumed once it reaches a terminal state.
pub struct StreamSession {
    request_id: RequestId,
    cancel: CancellationToken,
    state: SessionState,
    reconstructor: Reconstructor,
    materializer: Materializer,
    conversation: Arc<Conversation>,
    metrics: StreamMetric,
}

impl StreamSession {
    pub fn new(conversation: Arc<Conversation>, cancel: CancellationToken) -> Self {
        let request_id = RequestId::new();
        Self {
            materializer: Materializer::new(conversation.clone(), request_id.clone()),
            request_id,
            cancel,
            state: SessionState::Idle,
            reconstructor: Reconstructor::new(),
            conversation,
            metrics: StreamMetric::new(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn content(&self) -> &str {
        self.reconstructor.as_str()
    }

    /// Marks the request as issued and shows the typing indicator.
    pub fn begin(&mut self) {
        self.state = SessionState::Requesting;
        self.conversation.begin_typing(&self.request_id);
    }

    /// Issues the chat request and consumes its response to a terminal state.
    pub async fn run(
        mut self,
        client: &reqwest::Client,
        endpoint: &str,
        body: &ChatRequest,
    ) -> SessionReport {
        if self.state == SessionState::Idle {
            self.begin();
        }
        let url = format!("{}{}", endpoint, CHAT_PATH);
        tracing::debug!("[⚙️  -> ☁️ ] POST {}", url);

        let send = client.post(&url).json(body).send();
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abort(),
            response = send => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return self.fail(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abort(),
                text = response.text() => text.unwrap_or_default(),
            };
            return self.fail(TutorError::Upstream(status, body));
        }

        let byte_stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        self.consume(byte_stream).await
    }

    /// Drives frames from an already-open response body.
    pub async fn consume<R>(mut self, body: R) -> SessionReport
    where
        R: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin + Send,
    {
        if self.state == SessionState::Idle {
            self.begin();
        }
        self.state = SessionState::Streaming;
        let mut frames = FramedRead::new(StreamReader::new(body), LineCodec::new());

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abort(),
                next = frames.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    if self.handle_line(&line) {
                        tracing::debug!("[☁️  -> ⚙️ ] Stream end marker [DONE] received");
                        return self.complete();
                    }
                }
                Some(Err(e)) => {
                    if self.cancel.is_cancelled() {
                        return self.abort();
                    }
                    return self.fail(e.into());
                }
                None => {
                    tracing::debug!("[☁️  -> ⚙️ ] Stream closed without [DONE]");
                    return self.complete();
                }
            }
        }
    }

    /// Returns true when the line was the end-of-stream sentinel.
    fn handle_line(&mut self, line: &str) -> bool {
        let kind = extract(line);
        self.metrics.record_line(&kind);
        match kind {
            LineKind::Ignorable => false,
            LineKind::Sentinel => true,
            LineKind::Fragment(fragment) => {
                tracing::trace!(
                    "[☁️  -> ⚙️ ] Fragment: {}",
                    preview(&fragment, LOG_PREVIEW_CHARS)
                );
                if let Some(text) = self.reconstructor.append(&fragment) {
                    self.materializer.on_accumulator_changed(text);
                }
                false
            }
        }
    }

    fn complete(self) -> SessionReport {
        self.finish(SessionState::Completed)
    }

    fn abort(self) -> SessionReport {
        tracing::info!("[⚙️ ] Session {} stopped by user", self.request_id.short());
        self.finish(SessionState::Aborted)
    }

    fn fail(mut self, error: TutorError) -> SessionReport {
        tracing::error!("[☁️  -> ⚙️ ] Session {} failed: {}", self.request_id.short(), error);
        let text = error.to_string();
        self.materializer.fail_with(&text);
        self.conversation.toast(text);
        self.finish(SessionState::Failed)
    }

    fn finish(mut self, state: SessionState) -> SessionReport {
        self.state = state;
        self.conversation.end_typing(&self.request_id);
        self.metrics.log_summary(state);
        SessionReport {
            request_id: self.request_id,
            state,
            message_id: self.materializer.message_id(),
            content: self.reconstructor.into_string(),
        }
    }
}

/// Entry point for the chat screen.
///
/// Starting a session cancels the one still streaming, if any, so at most
/// one session writes to the conversation at a time.
pub struct StreamController {
    client: reqwest::Client,
    endpoint: String,
    session_id: SessionId,
    conversation: Arc<Conversation>,
    active: Mutex<Option<(RequestId, CancellationToken)>>,
}

impl StreamController {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        session_id: SessionId,
        conversation: Arc<Conversation>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            session_id,
            conversation,
            active: Mutex::new(None),
        }
    }

    pub fn from_state(state: &crate::main_helper::AppState) -> Self {
        Self::new(
            state.client.clone(),
            state.endpoint.clone(),
            state.session_id.clone(),
            state.conversation.clone(),
        )
    }

    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Adds the student's message, then streams the tutor's answer.
    pub async fn send(&self, text: &str) -> SessionReport {
        self.conversation.push(ChatMessage::student(text));
        self.start(text).await
    }

    /// Streams an answer to `problem_statement` without a student bubble.
    pub async fn kickoff(&self, problem_statement: &str) -> SessionReport {
        self.start(problem_statement).await
    }

    /// Cancels the session in flight, if any. Its message stays as last updated.
    pub fn stop(&self) {
        if let Some((request_id, token)) = self.lock_active().take() {
            tracing::debug!("[⚙️ ] Stop requested for {}", request_id.short());
            token.cancel();
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|(_, token)| !token.is_cancelled())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<(RequestId, CancellationToken)>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn install(&self, request_id: &RequestId, token: &CancellationToken) {
        let previous = self
            .lock_active()
            .replace((request_id.clone(), token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            tracing::info!(
                "[⚙️ ] Session {} supersedes {} which was still streaming",
                request_id.short(),
                previous_id.short()
            );
            previous_token.cancel();
        }
    }

    fn release(&self, request_id: &RequestId) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|(id, _)| id == request_id) {
            *active = None;
        }
    }

    async fn start(&self, text: &str) -> SessionReport {
        let token = CancellationToken::new();
        let mut session = StreamSession::new(self.conversation.clone(), token.clone());
        let request_id = session.request_id().clone();
        self.install(&request_id, &token);
        session.begin();

        let body = ChatRequest::streaming(&self.session_id, text);
        let span = tracing::info_span!(
            "stream_session",
            session_id = %self.session_id.short(),
            request_id = %request_id.short()
        );
        let report = session
            .run(&self.client, &self.endpoint, &body)
            .instrument(span)
            .await;

        self.release(&request_id);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn body(chunks: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin + Send {
        let owned: Vec<std::result::Result<Bytes, std::io::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        stream::iter(owned)
    }

    fn new_session() -> (Arc<Conversation>, CancellationToken, StreamSession) {
        let conversation = Arc::new(Conversation::new());
        let token = CancellationToken::new();
        let session = StreamSession::new(conversation.clone(), token.clone());
        (conversation, token, session)
    }

    #[tokio::test]
    async fn json_fragments_are_joined_until_done() {
        let (conversation, _, session) = new_session();
        let report = session
            .consume(body(&[
                "data: {\"text\":\"The \"}\n",
                "data: {\"text\":\"answer \"}\n",
                "data: {\"text\":\"is $x$\"}\n",
                "data: [DONE]\n",
                "data: {\"text\":\"ignored\"}\n",
            ]))
            .await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.content, "The answer is $x$");
        assert!(!conversation.is_typing());
        let messages = conversation.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "The answer is $x$");
    }

    #[tokio::test]
    async fn split_prefix_and_unterminated_tail_are_handled() {
        let (conversation, _, session) = new_session();
        let report = session
            .consume(body(&["da", "ta: \\te\nda", "ta: xt{hi}"]))
            .await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.content, "\\text{hi}");
        assert_eq!(conversation.messages()[0].content, "\\text{hi}");
    }

    #[tokio::test]
    async fn blank_only_stream_creates_no_message() {
        let (conversation, _, session) = new_session();
        let report = session
            .consume(body(&[": ping\n", "\n", "data: \n", "data: {\"text\":\"\"}\n", "data: [DONE]\n"]))
            .await;

        assert_eq!(report.state, SessionState::Completed);
        assert!(report.message_id.is_none());
        assert!(conversation.is_empty());
        assert!(!conversation.is_typing());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_keeps_partial_answer() {
        let (conversation, token, session) = new_session();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<std::result::Result<Bytes, std::io::Error>>();
        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
        let mut events = conversation.subscribe();

        let task = tokio::spawn(session.consume(stream));
        let _ = tx.send(Ok(Bytes::from("data: first\n")));
        let _ = tx.send(Ok(Bytes::from("data: second\n")));

        // Wait until both fragments are visible.
        loop {
            match events.recv().await {
                Ok(crate::conversation::ConversationEvent::MessageUpdated { content, .. })
                    if content == "first second" =>
                {
                    break
                }
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
        token.cancel();

        let report = task.await.unwrap();
        assert_eq!(report.state, SessionState::Aborted);
        assert_eq!(report.content, "first second");
        let messages = conversation.messages();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_error());
        assert!(!conversation.is_typing());
        drop(tx);
    }

    #[tokio::test]
    async fn read_error_replaces_partial_message_with_error() {
        let (conversation, _, session) = new_session();
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("data: partial\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
        ];
        let report = session.consume(stream::iter(chunks)).await;

        assert_eq!(report.state, SessionState::Failed);
        let messages = conversation.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_error());
        assert!(messages[0].content.contains("reset by peer"));
        assert_eq!(report.message_id, Some(messages[0].id));
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Aborted.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
    }
}
