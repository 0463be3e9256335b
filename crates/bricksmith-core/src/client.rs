use crate::error::Result;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// CompletionClient
// ---------------------------------------------------------------------------

/// One prompt for the completion capability.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// System prompt framing the task (role, output format).
    pub system: Option<String>,
    /// The user-facing prompt body.
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// The raw outcome of one completion round-trip.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Opaque correlation id for the LLM session that produced this text.
    pub session_id: String,
    /// Raw response text — not guaranteed to be well-formed anything.
    pub text: String,
}

/// The opaque LLM completion capability.
///
/// The pipeline never talks to a model directly; it goes through this seam.
/// The production implementation lives in the CLI crate (wrapping
/// `claude-driver`); tests substitute scripted stubs. Implementations are
/// responsible for bounding their own wall-clock time — a call that never
/// returns is a driver bug, not something callers guard against.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion>;
}
