//! `claude-driver` — timeout-bounded Rust driver for the Claude CLI subprocess.
//!
//! Implements the `--output-format stream-json` protocol as a library so the
//! `bricksmith` pipeline can obtain completions without a Node.js runtime.
//! The driver is deliberately single-turn: one prompt in over stdin, one
//! terminal result out, with a hard wall-clock deadline that kills the
//! subprocess on expiry.
//!
//! # Architecture
//!
//! ```text
//! CompletionOptions
//!     │
//!     ▼
//! ClaudeProcess     ← spawns `claude --output-format stream-json …`
//!     │                reads JSONL from stdout
//!     ▼
//! CompletionStream  ← futures::Stream<Item = Result<Message>>
//!     │                background task + mpsc channel + deadline
//!     ▼
//! Completion        ← session_id, result text, error flag
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use claude_driver::{complete, CompletionOptions, CompletionRequest};
//! use std::time::Duration;
//!
//! let result = complete(CompletionRequest {
//!     system_prompt: None,
//!     prompt: "Write a hello-world Python function.".into(),
//!     opts: CompletionOptions {
//!         model: Some("claude-sonnet-4-6".into()),
//!         timeout: Some(Duration::from_secs(600)),
//!         ..Default::default()
//!     },
//! }).await?;
//! println!("{}", result.text);
//! ```

pub mod error;
pub mod runner;
pub mod types;

pub(crate) mod process;
pub mod stream;

pub use error::DriverError;
pub use runner::{complete, Completion, CompletionRequest};
pub use stream::CompletionStream;
pub use types::{
    AssistantContent, AssistantMessage, CompletionOptions, ContentBlock, Message, PermissionMode,
    ResultError, ResultMessage, ResultSuccess, SystemMessage, SystemPayload,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
