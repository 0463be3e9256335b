use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::process::ClaudeProcess;
use crate::types::{CompletionOptions, Message};
use crate::{DriverError, Result};

// ─── CompletionStream ─────────────────────────────────────────────────────

/// An async stream of [`Message`]s from a Claude subprocess.
///
/// Backed by a Tokio mpsc channel. A background task owns [`ClaudeProcess`]
/// and forwards messages until it receives a terminal `Result` message, the
/// process exits, or the deadline from `CompletionOptions::timeout` passes.
/// The deadline covers the whole completion; on expiry the child is killed
/// and the stream yields `DriverError::Timeout` — a hung model call can
/// never wedge the pipeline.
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl CompletionStream {
    pub(crate) fn new(prompt: String, opts: CompletionOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let deadline = opts.timeout.map(|d| (Instant::now() + d, d.as_secs()));

            let mut process = match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut got_result = false;
            let mut timed_out = false;
            loop {
                let next = match deadline {
                    Some((at, secs)) => {
                        match tokio::time::timeout_at(at, process.next_message()).await {
                            Ok(r) => r,
                            Err(_) => {
                                let _ = tx.send(Err(DriverError::Timeout { secs })).await;
                                timed_out = true;
                                break;
                            }
                        }
                    }
                    None => process.next_message().await,
                };

                match next {
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    Ok(None) => break, // EOF — process exited
                    Ok(Some(msg)) => {
                        let is_terminal = matches!(msg, Message::Result(_));
                        if is_terminal {
                            got_result = true;
                        }
                        if tx.send(Ok(msg)).await.is_err() {
                            break; // Receiver dropped
                        }
                        if is_terminal {
                            break;
                        }
                    }
                }
            }

            // If the process exited without a Result message, surface a
            // non-zero exit code plus captured stderr. Skipped after a
            // timeout — the child is still running and about to be killed.
            if !got_result && !timed_out {
                if let Some(exit_err) = process.wait_exit_error().await {
                    let _ = tx.send(Err(exit_err)).await;
                }
            }

            process.kill().await;
        });

        CompletionStream { rx }
    }

    /// Test-only constructor: wrap a raw mpsc receiver as a stream.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

impl Stream for CompletionStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
