use futures::StreamExt;

use crate::stream::CompletionStream;
use crate::types::{CompletionOptions, Message};
use crate::{DriverError, Result};

// ─── CompletionRequest ────────────────────────────────────────────────────

/// One completion round-trip against the Claude CLI.
#[derive(Debug)]
pub struct CompletionRequest {
    /// System prompt override (replaces Claude's default system prompt).
    pub system_prompt: Option<String>,
    /// The user-facing prompt Claude will act on.
    pub prompt: String,
    /// Subprocess options: model, permission mode, timeout, etc.
    pub opts: CompletionOptions,
}

// ─── Completion ───────────────────────────────────────────────────────────

/// The terminal result of a completed round-trip.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Opaque correlation id for the session that produced this completion.
    pub session_id: String,
    /// The final text the model produced (empty string for error subtypes).
    pub text: String,
    pub num_turns: u32,
    /// `true` if the run ended with any error subtype (max_turns, etc.).
    pub is_error: bool,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Drive a single completion to its terminal result.
///
/// Merges `request.system_prompt` into the options, starts a
/// [`CompletionStream`], consumes messages until the terminal `Result`, and
/// returns it as a [`Completion`]. The deadline in
/// `CompletionOptions::timeout` bounds the whole call; on expiry the
/// subprocess is killed and `DriverError::Timeout` is returned.
///
/// Returns `Err` if the stream ends without a result message (process
/// crashed) or if any message fails to parse.
pub async fn complete(request: CompletionRequest) -> Result<Completion> {
    let mut opts = request.opts;
    if let Some(sp) = request.system_prompt {
        opts.system_prompt = Some(sp);
    }
    collect(CompletionStream::new(request.prompt, opts)).await
}

// ─── Internal ─────────────────────────────────────────────────────────────

/// Consume a [`CompletionStream`] and extract the terminal [`Completion`].
///
/// `pub(crate)` so tests can inject mock streams without spawning a real
/// Claude subprocess.
pub(crate) async fn collect(stream: CompletionStream) -> Result<Completion> {
    let mut stream = stream;
    let mut completion: Option<Completion> = None;

    while let Some(msg) = stream.next().await {
        if let Message::Result(r) = msg? {
            completion = Some(Completion {
                session_id: r.session_id().to_string(),
                text: r.result_text().unwrap_or("").to_string(),
                num_turns: r.num_turns(),
                is_error: r.is_error(),
            });
            // Result is the terminal message — no need to consume further.
            break;
        }
    }

    completion
        .ok_or_else(|| DriverError::Process("stream ended without a result message".into()))
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::types::{
        ResultError, ResultMessage, ResultSuccess, SystemInit, SystemMessage, SystemPayload,
    };

    fn success_msg(text: &str) -> Message {
        Message::Result(ResultMessage::Success(ResultSuccess {
            session_id: "s1".into(),
            result: text.to_string(),
            duration_ms: 10,
            is_error: false,
            num_turns: 3,
            total_cost_usd: 0.012,
        }))
    }

    fn error_msg() -> Message {
        Message::Result(ResultMessage::ErrorMaxTurns(ResultError {
            session_id: "s2".into(),
            duration_ms: 10,
            is_error: true,
            num_turns: 10,
            total_cost_usd: 0.005,
            errors: vec![],
        }))
    }

    fn system_init_msg() -> Message {
        Message::System(SystemMessage {
            session_id: "s1".into(),
            payload: SystemPayload::Init(SystemInit {
                model: "claude-sonnet-4-6".into(),
                permission_mode: Some("default".into()),
                cwd: Some("/tmp".into()),
            }),
        })
    }

    fn mock_stream(messages: Vec<Result<Message>>) -> CompletionStream {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for msg in messages {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        CompletionStream::from_channel(rx)
    }

    #[tokio::test]
    async fn collect_success_returns_text() {
        let stream = mock_stream(vec![Ok(success_msg("hello world"))]);
        let result = collect(stream).await.unwrap();
        assert_eq!(result.text, "hello world");
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.num_turns, 3);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn collect_error_subtype_sets_is_error_true() {
        let stream = mock_stream(vec![Ok(error_msg())]);
        let result = collect(stream).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.session_id, "s2");
        assert_eq!(result.num_turns, 10);
        assert_eq!(result.text, ""); // error subtypes have no result text
    }

    #[tokio::test]
    async fn collect_no_result_message_returns_err() {
        let (tx, rx) = mpsc::channel::<Result<Message>>(1);
        drop(tx); // sender dropped immediately — stream closes with no messages
        let stream = CompletionStream::from_channel(rx);
        let err = collect(stream).await;
        assert!(err.is_err());
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("result message"));
    }

    #[tokio::test]
    async fn collect_skips_non_result_messages() {
        let stream = mock_stream(vec![Ok(system_init_msg()), Ok(success_msg("done"))]);
        let result = collect(stream).await.unwrap();
        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn collect_propagates_stream_error() {
        let stream = mock_stream(vec![Err(DriverError::Process("injected error".into()))]);
        let err = collect(stream).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn collect_propagates_timeout() {
        let stream = mock_stream(vec![Err(DriverError::Timeout { secs: 1 })]);
        let err = collect(stream).await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { secs: 1 }));
    }
}
